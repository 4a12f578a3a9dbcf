use crate::payments::error::{PaymentError, PaymentResult, StateErrorKind};
use crate::payments::types::PaymentStatus;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Successful,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "outcome")]
pub enum AttemptState {
    Initiated,
    TokenAcquired,
    SessionOpened,
    AwaitingAuthentication,
    AuthenticationReceived,
    Provisioned,
    Terminal(Terminal),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Terminal(_))
    }

    fn allows(&self, next: AttemptState) -> bool {
        use AttemptState as S;
        match (*self, next) {
            (S::Terminal(_), _) => false,
            (_, S::Terminal(Terminal::Failed)) => true,
            (S::Initiated, S::TokenAcquired) => true,
            (S::TokenAcquired, S::Provisioned) => true,
            (S::TokenAcquired, S::SessionOpened) => true,
            (S::SessionOpened, S::AwaitingAuthentication) => true,
            (S::AwaitingAuthentication, S::AuthenticationReceived) => true,
            (S::AuthenticationReceived, S::Provisioned) => true,
            (S::Provisioned, S::Terminal(_)) => true,
            _ => false,
        }
    }
}

/// One payment's walk through the gateway protocol, with every state it visited.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAttempt {
    payment_id: String,
    state: AttemptState,
    history: Vec<AttemptState>,
}

impl PaymentAttempt {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self::resume(payment_id, AttemptState::Initiated)
    }

    /// Rehydrate an attempt whose earlier steps ran in another request.
    pub fn resume(payment_id: impl Into<String>, state: AttemptState) -> Self {
        Self {
            payment_id: payment_id.into(),
            state,
            history: vec![state],
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn history(&self) -> &[AttemptState] {
        &self.history
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn advance(&mut self, next: AttemptState) -> PaymentResult<()> {
        if !self.state.allows(next) {
            return Err(PaymentError::state(
                StateErrorKind::InvalidTransition,
                format!(
                    "payment {} cannot move from {:?} to {:?}",
                    self.payment_id, self.state, next
                ),
            ));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = AttemptState::Terminal(Terminal::Failed);
            self.history.push(self.state);
        }
    }

    /// Close a provisioned attempt according to the normalized outcome.
    /// Pending leaves it provisioned; the gateway still owns the decision.
    pub fn settle(&mut self, status: PaymentStatus) -> PaymentResult<()> {
        match status {
            PaymentStatus::Successful | PaymentStatus::Refunded => {
                self.advance(AttemptState::Terminal(Terminal::Successful))
            }
            PaymentStatus::Cancelled => self.advance(AttemptState::Terminal(Terminal::Cancelled)),
            PaymentStatus::Failed => self.advance(AttemptState::Terminal(Terminal::Failed)),
            PaymentStatus::Pending => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_three_d_path() {
        let mut attempt = PaymentAttempt::new("PAY-1");
        attempt.advance(AttemptState::TokenAcquired).unwrap();
        attempt.advance(AttemptState::Provisioned).unwrap();
        attempt.settle(PaymentStatus::Successful).unwrap();
        assert_eq!(
            attempt.history(),
            &[
                AttemptState::Initiated,
                AttemptState::TokenAcquired,
                AttemptState::Provisioned,
                AttemptState::Terminal(Terminal::Successful),
            ]
        );
    }

    #[test]
    fn three_d_path_resumes_after_redirect() {
        let mut attempt = PaymentAttempt::new("PAY-2");
        attempt.advance(AttemptState::TokenAcquired).unwrap();
        attempt.advance(AttemptState::SessionOpened).unwrap();
        attempt.advance(AttemptState::AwaitingAuthentication).unwrap();

        let mut resumed = PaymentAttempt::resume("PAY-2", AttemptState::AwaitingAuthentication);
        resumed.advance(AttemptState::AuthenticationReceived).unwrap();
        resumed.advance(AttemptState::Provisioned).unwrap();
        resumed.settle(PaymentStatus::Failed).unwrap();
        assert_eq!(resumed.state(), AttemptState::Terminal(Terminal::Failed));
    }

    #[test]
    fn skipping_authentication_is_rejected() {
        let mut attempt = PaymentAttempt::new("PAY-3");
        attempt.advance(AttemptState::TokenAcquired).unwrap();
        attempt.advance(AttemptState::SessionOpened).unwrap();
        let err = attempt.advance(AttemptState::Provisioned).unwrap_err();
        assert!(matches!(
            err,
            PaymentError::StateError {
                kind: StateErrorKind::InvalidTransition,
                ..
            }
        ));
        assert_eq!(attempt.state(), AttemptState::SessionOpened);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut attempt = PaymentAttempt::new("PAY-4");
        attempt.fail();
        assert!(attempt.advance(AttemptState::TokenAcquired).is_err());
        attempt.fail();
        assert_eq!(attempt.history().len(), 2);
    }
}
