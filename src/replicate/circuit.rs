//! Per-provider circuit breaker: `closed → open → half_open` with timed
//! auto-close. Open circuits route traffic around a provider for a cooldown
//! period; a half-open trial success closes the circuit, a failure reopens
//! it.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Tripped; requests are routed around the provider.
    Open,
    /// Cooldown elapsed; admitting a single trial.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: CircuitState,
    failure_count: u32,
    failure_threshold: u32,
    cooldown: Duration,
    last_failure: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold,
            cooldown: Duration::seconds(cooldown_secs as i64),
            last_failure: None,
        }
    }

    /// Whether a request may proceed. An open circuit transitions to
    /// half-open once the cooldown has elapsed.
    pub fn is_allowed(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(last) = self.last_failure {
                    if Utc::now() - last > self.cooldown {
                        self.state = CircuitState::HalfOpen;
                        tracing::info!(circuit = %self.name, "circuit half-open, admitting trial");
                        return true;
                    }
                }
                false
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            tracing::info!(circuit = %self.name, "circuit closed, provider recovered");
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Utc::now());
        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    tracing::warn!(circuit = %self.name, "circuit opened, too many failures");
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                tracing::warn!(circuit = %self.name, "circuit reopened, trial failed");
            }
            CircuitState::Open => {}
        }
    }

    /// Trip immediately regardless of the failure count (quota exhaustion).
    pub fn trip(&mut self) {
        self.failure_count = self.failure_threshold;
        self.last_failure = Some(Utc::now());
        if self.state != CircuitState::Open {
            self.state = CircuitState::Open;
            tracing::warn!(circuit = %self.name, "circuit tripped");
        }
    }

    #[inline]
    pub fn state(&self) -> CircuitState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut breaker = CircuitBreaker::new("provider-a", 3, 60);
        assert!(breaker.is_allowed());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new("provider-a", 3, 60);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn zero_cooldown_goes_half_open() {
        let mut breaker = CircuitBreaker::new("provider-a", 1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // Cooldown of zero: the next check admits a trial.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(breaker.is_allowed());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn trip_opens_immediately() {
        let mut breaker = CircuitBreaker::new("provider-a", 5, 60);
        breaker.trip();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed());
    }
}
