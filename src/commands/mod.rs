// Commands module: one file per subcommand, each returning an exit code

pub mod download;
pub mod inspect;
pub mod list;
