//! Transient notifications.

use std::time::{Duration, Instant};

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    /// An operation went through.
    Success,
    /// An operation failed and was undone.
    Error,
    /// Neutral information.
    Info,
}

/// One notification shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Handle used to dismiss it.
    pub id: u64,
    /// Severity.
    pub kind: ToastKind,
    /// Plain-language message.
    pub message: String,
    /// When it was raised.
    pub created_at: Instant,
}

impl Toast {
    /// Returns true once `lifetime` has passed since the toast was raised.
    #[must_use]
    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= lifetime
    }
}

/// Toasts in the order they were raised.
#[derive(Debug)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
    lifetime: Duration,
    next_id: u64,
}

impl ToastQueue {
    /// Creates an empty queue whose toasts live for `lifetime`.
    #[must_use]
    pub const fn new(lifetime: Duration) -> Self {
        Self {
            toasts: Vec::new(),
            lifetime,
            next_id: 1,
        }
    }

    /// Raises a toast and returns its id. Expired toasts are dropped first.
    pub fn push(&mut self, kind: ToastKind, message: impl Into<String>, now: Instant) -> u64 {
        self.prune(now);
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            kind,
            message: message.into(),
            created_at: now,
        });
        id
    }

    /// Removes a toast. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != before
    }

    /// Drops expired toasts and returns the live ones.
    pub fn active(&mut self, now: Instant) -> Vec<Toast> {
        self.prune(now);
        self.toasts.clone()
    }

    fn prune(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.toasts.retain(|t| !t.is_expired(now, lifetime));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toasts_expire() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(Duration::from_secs(3));
        queue.push(ToastKind::Error, "Could not delete", start);
        queue.push(
            ToastKind::Success,
            "Sent",
            start + Duration::from_secs(2),
        );

        assert_eq!(queue.active(start + Duration::from_secs(1)).len(), 2);

        let live = queue.active(start + Duration::from_secs(4));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "Sent");

        assert!(queue.active(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_push_drops_expired_toasts() {
        let start = Instant::now();
        let mut queue = ToastQueue::new(Duration::from_secs(3));
        for i in 0..10 {
            let now = start + Duration::from_secs(i);
            queue.push(ToastKind::Error, "Could not update the star.", now);
        }
        // Raised at 7s, 8s and 9s; nothing older stays queued.
        assert_eq!(queue.toasts.len(), 3);
        assert_eq!(queue.toasts[0].created_at, start + Duration::from_secs(7));
    }

    #[test]
    fn test_dismiss() {
        let now = Instant::now();
        let mut queue = ToastQueue::new(Duration::from_secs(3));
        let first = queue.push(ToastKind::Info, "a", now);
        let second = queue.push(ToastKind::Info, "b", now);
        assert_ne!(first, second);

        assert!(queue.dismiss(first));
        assert!(!queue.dismiss(first));
        let live = queue.active(now);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, second);
    }
}
