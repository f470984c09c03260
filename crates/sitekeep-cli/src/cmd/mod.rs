pub(crate) mod daemon;
pub(crate) mod prune;
pub(crate) mod run;
pub(crate) mod test;
