pub mod assemble;
pub mod config_cmd;
pub mod count;
pub mod rewrite;
