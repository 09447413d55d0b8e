#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Server,
    Caller,
    Fallback,
}

impl KeySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Caller => "caller",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub source: KeySource,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Which provider key a submission runs with: the server-held key first, then
/// the caller's key (when allowed), then an optional shared fallback key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyPolicy {
    pub server_key: Option<String>,
    pub allow_caller_key: bool,
    pub fallback_key: Option<String>,
}

impl Default for ApiKeyPolicy {
    fn default() -> Self {
        Self {
            server_key: None,
            allow_caller_key: true,
            fallback_key: None,
        }
    }
}

impl std::fmt::Debug for ApiKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPolicy")
            .field("server_key", &self.server_key.as_ref().map(|_| "<redacted>"))
            .field("allow_caller_key", &self.allow_caller_key)
            .field("fallback_key", &self.fallback_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiKeyPolicy {
    pub fn resolve(&self, caller_key: Option<&str>) -> Option<ResolvedKey> {
        let usable = |key: Option<&str>| key.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned);

        if let Some(key) = usable(self.server_key.as_deref()) {
            return Some(ResolvedKey {
                key,
                source: KeySource::Server,
            });
        }
        if self.allow_caller_key {
            if let Some(key) = usable(caller_key) {
                return Some(ResolvedKey {
                    key,
                    source: KeySource::Caller,
                });
            }
        }
        usable(self.fallback_key.as_deref()).map(|key| ResolvedKey {
            key,
            source: KeySource::Fallback,
        })
    }
}
