pub mod converters;
pub mod load_config;
