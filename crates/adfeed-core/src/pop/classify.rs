//! Classify remote responses to delivery attempts.

/// What a response status means for a delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 1xx–3xx: accepted, nothing more to do.
    Delivered,
    /// 4xx: the service will never accept this request.
    Rejected,
    /// 5xx or anything unexpected: try again later.
    Retry,
}

pub fn classify_status(code: u32) -> Disposition {
    match code {
        100..=399 => Disposition::Delivered,
        400..=499 => Disposition::Rejected,
        _ => Disposition::Retry,
    }
}
