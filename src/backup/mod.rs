pub mod action;
pub mod command;
pub mod compress;
pub mod config;
pub mod context;
pub mod finish;
pub mod interrupt;
pub mod logging;
pub mod orchestrator;
pub mod probe_cache;
pub mod redacted;
pub mod report;
pub mod result_error;
pub mod retention;
pub mod selector;
pub mod storage;
pub mod syslog;
pub mod tar;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
