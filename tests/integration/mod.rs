//! Integration tests for the certrun verification harness

mod config_loading;
mod end_to_end;
mod interrupt;
mod support;
