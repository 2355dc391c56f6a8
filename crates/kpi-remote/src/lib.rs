//! 网元远程访问：交互式 Shell 命令与 SFTP 分块读取

pub mod error;
pub mod memory;
pub mod reader;
pub mod session;
pub mod shell;
pub mod ssh;

pub use error::{Result, TransportError};
pub use memory::{MemoryHost, MemorySession, MemorySessionFactory};
pub use session::{RemoteSession, SessionFactory, SessionOptions};
pub use ssh::{SshSession, SshSessionFactory};
