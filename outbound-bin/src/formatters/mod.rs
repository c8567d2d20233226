pub(crate) mod host_stats;
pub(crate) mod log;
pub(crate) mod response;
