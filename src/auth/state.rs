//! Authentication state trait.

use crate::coordinator::AuthCoordinator;
use crate::session::SessionKeys;

/// Trait for state types that give handlers and middleware access to both
/// credential layers.
pub trait HasAuthState {
    fn sessions(&self) -> &SessionKeys;
    fn coordinator(&self) -> &AuthCoordinator;
    /// Whether to set the Secure flag on cookies
    fn secure_cookies(&self) -> bool;
}
