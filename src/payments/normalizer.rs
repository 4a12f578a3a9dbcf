//! Maps heterogeneous gateway answers onto one [`PaymentStatus`].
//!
//! Precedence, first match wins:
//! 1. an explicit response code (approved / pending / anything else = failed);
//!    an approved charge or capture that still carries a redirect is pending
//! 2. a redirect artifact, which always means the payment is still pending
//! 3. the textual status
//! 4. a bare success flag, trusted only for cancel and refund acknowledgements
//! 5. failed
//!
//! Nothing unknown ever maps to a success status.

use crate::payments::types::{NormalizedResult, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Charge,
    Capture,
    Cancel,
    Refund,
    Status,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Charge => "charge",
            Operation::Capture => "capture",
            Operation::Cancel => "cancel",
            Operation::Refund => "refund",
            Operation::Status => "status",
        }
    }

    fn success_status(&self) -> PaymentStatus {
        match self {
            Operation::Charge | Operation::Capture | Operation::Status => {
                PaymentStatus::Successful
            }
            Operation::Cancel => PaymentStatus::Cancelled,
            Operation::Refund => PaymentStatus::Refunded,
        }
    }
}

/// Response codes a gateway uses for "approved" and "still in progress".
#[derive(Debug, Clone, Copy)]
pub struct ResponseCodes {
    pub approved: &'static [&'static str],
    pub pending: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct VendorSignals<'a> {
    pub success_flag: Option<bool>,
    pub response_code: Option<&'a str>,
    pub status_text: Option<&'a str>,
    pub has_redirect: bool,
    pub operation: Operation,
}

impl<'a> VendorSignals<'a> {
    pub fn new(operation: Operation) -> Self {
        Self {
            success_flag: None,
            response_code: None,
            status_text: None,
            has_redirect: false,
            operation,
        }
    }

    pub fn success_flag(mut self, flag: Option<bool>) -> Self {
        self.success_flag = flag;
        self
    }

    pub fn response_code(mut self, code: Option<&'a str>) -> Self {
        self.response_code = code.map(str::trim).filter(|c| !c.is_empty());
        self
    }

    pub fn status_text(mut self, text: Option<&'a str>) -> Self {
        self.status_text = text.map(str::trim).filter(|t| !t.is_empty());
        self
    }

    pub fn redirect(mut self, has_redirect: bool) -> Self {
        self.has_redirect = has_redirect;
        self
    }
}

fn status_from_text(text: &str, operation: Operation) -> PaymentStatus {
    match text.to_uppercase().as_str() {
        "SUCCESS" | "SUCCEEDED" | "APPROVED" | "CAPTURED" => operation.success_status(),
        "PENDING" | "WAITING" | "PROCESSING" => PaymentStatus::Pending,
        "CANCELLED" | "CANCELED" | "VOIDED" => PaymentStatus::Cancelled,
        "REFUNDED" => PaymentStatus::Refunded,
        _ => PaymentStatus::Failed,
    }
}

pub fn normalize_status(signals: &VendorSignals<'_>, codes: &ResponseCodes) -> PaymentStatus {
    if let Some(code) = signals.response_code {
        if codes.approved.contains(&code) {
            // An approved inquiry only says the lookup worked; the text says what happened.
            if signals.operation == Operation::Status {
                if let Some(text) = signals.status_text {
                    return status_from_text(text, Operation::Status);
                }
            }
            if signals.has_redirect
                && matches!(signals.operation, Operation::Charge | Operation::Capture)
            {
                return PaymentStatus::Pending;
            }
            return signals.operation.success_status();
        }
        if codes.pending.contains(&code) {
            return PaymentStatus::Pending;
        }
        return PaymentStatus::Failed;
    }

    if signals.has_redirect {
        return PaymentStatus::Pending;
    }

    if let Some(text) = signals.status_text {
        return status_from_text(text, signals.operation);
    }

    if signals.success_flag == Some(true)
        && matches!(signals.operation, Operation::Cancel | Operation::Refund)
    {
        return signals.operation.success_status();
    }

    PaymentStatus::Failed
}

/// Builds the result skeleton. A failed result keeps the vendor's code so
/// callers can tell a decline from an unknown answer.
pub fn normalize(
    payment_id: &str,
    signals: &VendorSignals<'_>,
    codes: &ResponseCodes,
) -> NormalizedResult {
    let status = normalize_status(signals, codes);
    let mut result = NormalizedResult::new(payment_id, status);
    if status == PaymentStatus::Failed {
        result.error_code = Some(
            signals
                .response_code
                .or(signals.status_text)
                .unwrap_or("unknown_response")
                .to_string(),
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODES: ResponseCodes = ResponseCodes {
        approved: &["00"],
        pending: &["1001"],
    };

    #[test]
    fn redirect_wins_over_success_flag() {
        let signals = VendorSignals::new(Operation::Charge)
            .success_flag(Some(true))
            .redirect(true);
        assert_eq!(normalize_status(&signals, &CODES), PaymentStatus::Pending);

        let with_text = signals.status_text(Some("APPROVED"));
        assert_eq!(normalize_status(&with_text, &CODES), PaymentStatus::Pending);
    }

    #[test]
    fn redirect_wins_over_approved_code() {
        let signals = VendorSignals::new(Operation::Charge)
            .success_flag(Some(true))
            .response_code(Some("00"))
            .redirect(true);
        let result = normalize("PAY-1", &signals, &CODES);
        assert_eq!(result.status, PaymentStatus::Pending);
        assert!(!result.success);
        assert!(result.error_code.is_none());

        let capture = VendorSignals::new(Operation::Capture)
            .response_code(Some("00"))
            .redirect(true);
        assert_eq!(normalize_status(&capture, &CODES), PaymentStatus::Pending);
    }

    #[test]
    fn explicit_decline_code_wins_over_redirect() {
        let signals = VendorSignals::new(Operation::Charge)
            .response_code(Some("51"))
            .redirect(true);
        let result = normalize("PAY-1", &signals, &CODES);
        assert_eq!(result.status, PaymentStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("51"));
        assert!(!result.success);
    }

    #[test]
    fn codes_map_per_operation() {
        let approved = |op| VendorSignals::new(op).response_code(Some("00"));
        assert_eq!(
            normalize_status(&approved(Operation::Capture), &CODES),
            PaymentStatus::Successful
        );
        assert_eq!(
            normalize_status(&approved(Operation::Cancel), &CODES),
            PaymentStatus::Cancelled
        );
        assert_eq!(
            normalize_status(&approved(Operation::Refund), &CODES),
            PaymentStatus::Refunded
        );
        let pending = VendorSignals::new(Operation::Charge).response_code(Some("1001"));
        assert_eq!(normalize_status(&pending, &CODES), PaymentStatus::Pending);
    }

    #[test]
    fn status_inquiry_reads_the_text_behind_an_approved_code() {
        let voided = VendorSignals::new(Operation::Status)
            .response_code(Some("00"))
            .status_text(Some("VOIDED"));
        assert_eq!(normalize_status(&voided, &CODES), PaymentStatus::Cancelled);

        let bare = VendorSignals::new(Operation::Status).response_code(Some("00"));
        assert_eq!(normalize_status(&bare, &CODES), PaymentStatus::Successful);
    }

    #[test]
    fn bare_flag_only_counts_for_acknowledgements() {
        let charge = VendorSignals::new(Operation::Charge).success_flag(Some(true));
        assert_eq!(normalize_status(&charge, &CODES), PaymentStatus::Failed);

        let cancel = VendorSignals::new(Operation::Cancel).success_flag(Some(true));
        let result = normalize("PAY-1", &cancel, &CODES);
        assert_eq!(result.status, PaymentStatus::Cancelled);
        assert!(result.success);
    }

    #[test]
    fn unknown_answers_fail_closed() {
        let empty = VendorSignals::new(Operation::Capture);
        let result = normalize("PAY-1", &empty, &CODES);
        assert_eq!(result.status, PaymentStatus::Failed);
        assert_eq!(result.error_code.as_deref(), Some("unknown_response"));

        let odd = VendorSignals::new(Operation::Charge).status_text(Some("MAYBE"));
        assert_eq!(normalize_status(&odd, &CODES), PaymentStatus::Failed);

        let blank_code = VendorSignals::new(Operation::Charge)
            .response_code(Some("  "))
            .status_text(Some("approved"));
        assert_eq!(
            normalize_status(&blank_code, &CODES),
            PaymentStatus::Successful
        );
    }
}
