//! CLI domain: parse, route, output and presentation.
//! Route handlers stay thin and dispatch to the DBAFS and filesystem façade.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_change_set_json, format_change_set_text, format_item_text, format_listing_text,
};
pub use route::RunContext;
