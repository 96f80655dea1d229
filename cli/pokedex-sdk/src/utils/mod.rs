pub mod debounce;
pub mod logging;
