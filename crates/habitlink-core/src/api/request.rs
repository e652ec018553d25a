use std::fmt;

/// Remote endpoints exposed by the partner API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiRequest {
    /// Exchange a partner user id for a bearer token.
    CreateBearerToken,
    /// Report that the identified user completed today's habit.
    CompleteDailyHabit,
}

impl ApiRequest {
    /// Path relative to the environment's base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ApiRequest::CreateBearerToken => "createBearerToken",
            ApiRequest::CompleteDailyHabit => "completeDailyHabit",
        }
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
