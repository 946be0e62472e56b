//! Navigation targets requested by the session and chat stores.
//!
//! The library does not own navigation. Stores record the route they want
//! shown next and the caller takes it (see `take_navigation`).

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    Login { session_expired: bool },
    Signup,
    Chats,
    Chat(String),
}

impl Route {
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_owned(),
            Self::Login { .. } => "/login".to_owned(),
            Self::Signup => "/signup".to_owned(),
            Self::Chats => "/chats".to_owned(),
            Self::Chat(chat_id) => format!("/chats/{chat_id}"),
        }
    }

    #[must_use]
    pub fn session_expired() -> Self {
        Self::Login { session_expired: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_match_app_routes() {
        assert_eq!(Route::Home.path(), "/");
        assert_eq!(Route::session_expired().path(), "/login");
        assert_eq!(Route::Signup.path(), "/signup");
        assert_eq!(Route::Chats.path(), "/chats");
        assert_eq!(Route::Chat("abc".into()).path(), "/chats/abc");
    }
}
