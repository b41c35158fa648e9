pub mod app;
pub mod logging;
pub mod settings;
pub mod speedtest;
pub mod ui;
