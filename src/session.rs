use parking_lot::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub handle: String,
}

/// Supplies the author handle used when composing comments. The handle is
/// read here and passed explicitly into the submitter; nothing else in the
/// crate reaches for a global current user.
pub struct Manager {
    current: RwLock<Option<Account>>,
}

impl Manager {
    pub fn new(handle: Option<String>) -> Self {
        let current = handle
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .map(|handle| Account { handle });
        Self {
            current: RwLock::new(current),
        }
    }

    pub fn current(&self) -> Option<Account> {
        self.current.read().clone()
    }

    pub fn handle(&self) -> Result<String, SessionError> {
        self.current
            .read()
            .as_ref()
            .map(|account| account.handle.clone())
            .ok_or(SessionError::NotLoggedIn)
    }

    pub fn login(&self, handle: &str) -> Result<Account, SessionError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(SessionError::NotLoggedIn);
        }
        let account = Account {
            handle: handle.to_string(),
        };
        *self.current.write() = Some(account.clone());
        Ok(account)
    }

    pub fn logout(&self) {
        *self.current.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_logged_out_without_handle() {
        let manager = Manager::new(None);
        assert!(manager.current().is_none());
        assert!(matches!(manager.handle(), Err(SessionError::NotLoggedIn)));
    }

    #[test]
    fn blank_configured_handle_counts_as_logged_out() {
        let manager = Manager::new(Some("   ".into()));
        assert!(manager.current().is_none());
    }

    #[test]
    fn login_and_logout_round_trip() {
        let manager = Manager::new(None);
        manager.login("alice").unwrap();
        assert_eq!(manager.handle().unwrap(), "alice");
        manager.logout();
        assert!(manager.handle().is_err());
    }
}
