pub mod export;

pub use export::{export_csv, export_json_lines, write_csv, write_json_lines};
