/// Supplies bearer tokens for outbound requests.
///
/// Token acquisition and refresh happen elsewhere; this only reports the token
/// currently available, if any.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|value| !value.trim().is_empty());
        Self { token }
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}
