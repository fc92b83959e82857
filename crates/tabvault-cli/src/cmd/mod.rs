pub(crate) mod export;
pub(crate) mod import;
pub(crate) mod recover;
pub(crate) mod status;
pub(crate) mod sweep;
pub(crate) mod sync;
pub(crate) mod verify;
