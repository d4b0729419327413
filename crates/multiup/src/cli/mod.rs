mod app;
mod hosts;
mod tokens;
mod upload;

pub use app::App;
