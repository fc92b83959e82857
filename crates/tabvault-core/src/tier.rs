use serde::{Deserialize, Serialize};
use tabvault_types::error::{Result, VaultError};
use tabvault_types::item::{ArchivedItem, ArchivedTab, VaultSnapshot, DEFAULT_GROUP_COLOR};

use crate::chunker::{plan_chunks, ChunkPlan};
use crate::codec::{Codec, EncodedPayload};
use crate::config::KeyLayout;

/// Fidelity ladder for fitting a vault into the remote budget. Later tiers
/// lose strictly more data than earlier ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CompressionTier {
    #[default]
    Full,
    NoFavicons,
    Minimal,
}

impl CompressionTier {
    pub const ALL: [CompressionTier; 3] = [
        CompressionTier::Full,
        CompressionTier::NoFavicons,
        CompressionTier::Minimal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionTier::Full => "full",
            CompressionTier::NoFavicons => "no_favicons",
            CompressionTier::Minimal => "minimal",
        }
    }

    /// A copy of `snapshot` with this tier's fields stripped.
    ///
    /// `NoFavicons` drops favicons. `Minimal` also drops original ids, the
    /// `was_*` flags, group colors and collapsed state.
    pub fn apply(self, snapshot: &VaultSnapshot) -> VaultSnapshot {
        let mut stripped = snapshot.clone();
        if self == CompressionTier::Full {
            return stripped;
        }
        for item in &mut stripped.items {
            match item {
                ArchivedItem::Tab(tab) => self.strip_tab(tab),
                ArchivedItem::Group(group) => {
                    for tab in &mut group.tabs {
                        self.strip_tab(tab);
                    }
                    if self == CompressionTier::Minimal {
                        group.original_id = None;
                        group.color = DEFAULT_GROUP_COLOR.to_string();
                        group.collapsed = false;
                    }
                }
            }
        }
        stripped
    }

    fn strip_tab(self, tab: &mut ArchivedTab) {
        tab.fav_icon_url = None;
        if self == CompressionTier::Minimal {
            tab.original_id = None;
            tab.was_pinned = false;
            tab.was_muted = false;
            tab.was_frozen = false;
        }
    }
}

impl std::fmt::Display for CompressionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunk geometry the negotiator measures candidates against.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGeometry<'a> {
    pub keys: &'a KeyLayout,
    pub per_item_quota: u64,
    pub overhead: u64,
}

impl ChunkGeometry<'_> {
    pub fn plan(&self, packed: &str) -> Result<ChunkPlan> {
        plan_chunks(packed, self.keys, self.per_item_quota, self.overhead)
    }
}

/// The least lossy encoding that fits.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub tier: CompressionTier,
    pub payload: EncodedPayload,
    pub plan: ChunkPlan,
}

/// Find the first tier (minified before plain within a tier) whose chunked
/// size fits `budget`.
///
/// Returns [`VaultError::PayloadTooLarge`] when nothing fits and propagates
/// [`VaultError::ChunkBudgetExceeded`] from the chunker.
pub fn negotiate(
    codec: &Codec,
    snapshot: &VaultSnapshot,
    budget: u64,
    geometry: ChunkGeometry<'_>,
) -> Result<Negotiated> {
    let mut smallest = u64::MAX;
    for tier in CompressionTier::ALL {
        let stripped = tier.apply(snapshot);
        for minify in [true, false] {
            let payload = codec.encode(&stripped, minify)?;
            let plan = geometry.plan(&payload.packed)?;
            let size = plan.stored_bytes();
            tracing::debug!(
                tier = tier.as_str(),
                minify,
                size,
                budget,
                "measured tier candidate"
            );
            if size <= budget {
                return Ok(Negotiated {
                    tier,
                    payload,
                    plan,
                });
            }
            smallest = smallest.min(size);
        }
    }
    Err(VaultError::PayloadTooLarge {
        size: smallest,
        budget,
    })
}
