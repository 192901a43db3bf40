pub mod daemon;
pub mod fetch;
pub mod init;
pub mod keys;
pub mod publish;
pub mod resolve;
pub mod shell;
pub mod version;

pub use daemon::Daemon;
pub use fetch::Fetch;
pub use init::Init;
pub use keys::Keys;
pub use publish::Publish;
pub use resolve::Resolve;
pub use shell::Shell;
pub use version::Version;
