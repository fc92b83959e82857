mod diff;
mod quota;
