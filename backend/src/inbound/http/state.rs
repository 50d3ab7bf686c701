//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain ports (use-cases) and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{FailureAnalyticsQuery, SubmissionService};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub submissions: Arc<dyn SubmissionService>,
    pub analytics: Arc<dyn FailureAnalyticsQuery>,
}

impl HttpState {
    /// Construct state from the driving ports.
    ///
    /// # Examples
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use mockable::DefaultClock;
    /// use pantry_backend::domain::FailureAnalyticsService;
    /// use pantry_backend::inbound::http::state::HttpState;
    /// use pantry_backend::outbound::memory::InMemoryFailedAttemptRepository;
    /// # fn submissions() -> Arc<dyn pantry_backend::domain::ports::SubmissionService> {
    /// #     unimplemented!()
    /// # }
    ///
    /// let analytics = FailureAnalyticsService::new(
    ///     Arc::new(InMemoryFailedAttemptRepository::default()),
    ///     Arc::new(DefaultClock),
    /// );
    /// let state = HttpState::new(submissions(), Arc::new(analytics));
    /// let _submissions = state.submissions.clone();
    /// ```
    pub fn new(
        submissions: Arc<dyn SubmissionService>,
        analytics: Arc<dyn FailureAnalyticsQuery>,
    ) -> Self {
        Self {
            submissions,
            analytics,
        }
    }
}
