pub mod check;
pub mod hash;
pub mod import;
pub mod list;

use async_trait::async_trait;

use crate::error::Result;

// Styled output prefixes (Classic ASCII)
pub(crate) const SUCCESS_PREFIX: &str = "[OK]";
pub(crate) const INFO_PREFIX: &str = "[*]";
pub(crate) const WARNING_PREFIX: &str = "[!]";

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
