pub mod init;
pub mod partition;
pub mod status;
pub mod sync;
