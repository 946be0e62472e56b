//! Request-status wrapper around a single async value.
//!
//! DESIGN
//! ======
//! Every fetch-backed piece of state in the client is an `ApiState<T>`: the
//! last successfully loaded value plus the status of the most recent request.
//! Errors never clear the data, so the last good value stays visible next to
//! the error message. There is no concurrency control; overlapping requests
//! resolve as last write wins.

#[cfg(test)]
#[path = "api_state_test.rs"]
mod api_state_test;

/// Status of the most recent request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApiStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Status and error saved before a request starts, so a request that ends
/// without an outcome (cancelled, redirected) can put them back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    status: ApiStatus,
    error: String,
}

#[derive(Clone, Debug)]
pub struct ApiState<T> {
    data: Option<T>,
    status: ApiStatus,
    error: String,
}

impl<T> Default for ApiState<T> {
    fn default() -> Self {
        Self { data: None, status: ApiStatus::Idle, error: String::new() }
    }
}

impl<T> ApiState<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a request in flight. Clears the error, keeps the data.
    pub fn set_loading(&mut self) {
        self.status = ApiStatus::Loading;
        self.error.clear();
    }

    /// Mark a request in flight and return what it replaced.
    pub fn begin_loading(&mut self) -> Checkpoint {
        let checkpoint = Checkpoint { status: self.status, error: std::mem::take(&mut self.error) };
        self.status = ApiStatus::Loading;
        checkpoint
    }

    /// Undo [`ApiState::begin_loading`] for a request that produced no
    /// outcome. Data is not touched.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.status = checkpoint.status;
        self.error = checkpoint.error;
    }

    /// Store `data` and mark success.
    pub fn set_success(&mut self, data: T) {
        self.data = Some(data);
        self.status = ApiStatus::Success;
        self.error.clear();
    }

    /// Functional form of [`ApiState::set_success`]: build the new value from
    /// the previous one.
    pub fn update_success(&mut self, update: impl FnOnce(Option<T>) -> T) {
        let next = update(self.data.take());
        self.set_success(next);
    }

    /// Mark failure. The last known data stays in place.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = ApiStatus::Error;
        self.error = message.into();
    }

    /// Back to idle with no data.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Mutable access for in-place edits that are not request outcomes
    /// (socket pushes); the status is left untouched.
    pub fn data_mut(&mut self) -> Option<&mut T> {
        self.data.as_mut()
    }

    /// Like [`ApiState::data_mut`], inserting a value first when empty.
    pub fn data_or_insert_with(&mut self, init: impl FnOnce() -> T) -> &mut T {
        self.data.get_or_insert_with(init)
    }

    #[must_use]
    pub fn status(&self) -> ApiStatus {
        self.status
    }

    /// Error message of the last failure, empty when there is none.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.status == ApiStatus::Idle
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == ApiStatus::Loading
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ApiStatus::Success
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ApiStatus::Error
    }
}
