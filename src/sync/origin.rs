/// Change origin tracker
///
/// Echo suppression as an explicit state machine per workflow id:
///
/// ```text
/// untagged --mark_pending--> pending(origin) --arm--> armed(origin, deadline)
///     ^                          |                        |
///     +--------- clear ----------+---- acknowledge_echo / deadline passed
/// ```
///
/// While a workflow is pending or armed for an origin that writes the local
/// snapshot, filesystem events for that workflow are the engine's own write
/// and must not come back as new local-file intents.

use crate::sync::intent::Origin;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Observable state of one workflow's tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagState {
    Untagged,
    /// The engine is writing; no deadline yet
    Pending(Origin),
    /// The write finished; suppression lasts until the grace window ends
    Armed(Origin),
}

#[derive(Debug, Clone)]
enum Tag {
    Pending { origin: Origin },
    Armed { origin: Origin, until: Instant },
}

impl Tag {
    fn origin(&self) -> &Origin {
        match self {
            Tag::Pending { origin } | Tag::Armed { origin, .. } => origin,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        matches!(self, Tag::Armed { until, .. } if now >= *until)
    }
}

/// Single tag per workflow id; the engine's per-id queue guarantees at most
/// one propagation sets it at a time.
#[derive(Debug)]
pub struct ChangeOriginTracker {
    tags: Mutex<HashMap<String, Tag>>,
    grace: Duration,
}

impl ChangeOriginTracker {
    /// `grace` bounds how long an armed tag survives if the watcher never fires
    pub fn new(grace: Duration) -> Self {
        Self {
            tags: Mutex::new(HashMap::new()),
            grace,
        }
    }

    fn tags(&self) -> MutexGuard<'_, HashMap<String, Tag>> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start of a propagation: the engine is about to write for `origin`
    ///
    /// A local-file propagation does not write the snapshot, so it leaves a
    /// live tag from an earlier engine write in place: that write's echo may
    /// still be on its way. Returns whether `origin` now owns the tag.
    pub fn mark_pending(&self, workflow_id: &str, origin: Origin) -> bool {
        let mut tags = self.tags();
        let now = Instant::now();
        tags.retain(|_, tag| !tag.expired(now));

        if !origin.writes_local() {
            if let Some(existing) = tags.get(workflow_id) {
                if existing.origin().writes_local() {
                    tracing::debug!(
                        "🏷️ Keeping {} tag on workflow {} during local-file propagation",
                        existing.origin(),
                        workflow_id
                    );
                    return false;
                }
            }
        }

        tracing::debug!("🏷️ Tagging workflow {} as pending from {}", workflow_id, origin);
        tags.insert(workflow_id.to_string(), Tag::Pending { origin });
        true
    }

    /// The local write finished: start the grace window
    pub fn arm(&self, workflow_id: &str) {
        let mut tags = self.tags();
        if let Some(tag) = tags.get_mut(workflow_id) {
            let origin = tag.origin().clone();
            *tag = Tag::Armed {
                origin,
                until: Instant::now() + self.grace,
            };
        }
    }

    /// Whether a filesystem event for `workflow_id` is an echo right now
    ///
    /// Tags from local-file origins never suppress: the engine did not write
    /// the file, so any event is a genuine new edit.
    pub fn is_suppressed(&self, workflow_id: &str) -> bool {
        let mut tags = self.tags();
        let Some(tag) = tags.get(workflow_id) else {
            return false;
        };
        if tag.expired(Instant::now()) {
            tags.remove(workflow_id);
            return false;
        }
        tag.origin().writes_local()
    }

    /// The watcher saw and discarded the echo; drop an armed tag early
    ///
    /// A pending tag stays: the write is still in progress and more events
    /// for it may follow.
    pub fn acknowledge_echo(&self, workflow_id: &str) -> bool {
        let mut tags = self.tags();
        match tags.get(workflow_id) {
            Some(Tag::Armed { .. }) => {
                tags.remove(workflow_id);
                tracing::debug!("🔇 Echo for workflow {} suppressed and acknowledged", workflow_id);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self, workflow_id: &str) {
        self.tags().remove(workflow_id);
    }

    /// Clear the tag only if it still belongs to `origin`
    pub fn clear_if(&self, workflow_id: &str, origin: &Origin) -> bool {
        let mut tags = self.tags();
        match tags.get(workflow_id) {
            Some(tag) if tag.origin() == origin => {
                tags.remove(workflow_id);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, workflow_id: &str) -> TagState {
        let mut tags = self.tags();
        match tags.get(workflow_id) {
            None => TagState::Untagged,
            Some(tag) if tag.expired(Instant::now()) => {
                tags.remove(workflow_id);
                TagState::Untagged
            }
            Some(Tag::Pending { origin }) => TagState::Pending(origin.clone()),
            Some(Tag::Armed { origin, .. }) => TagState::Armed(origin.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_state_machine() {
        let tracker = ChangeOriginTracker::new(Duration::from_secs(60));
        assert_eq!(tracker.state("w"), TagState::Untagged);
        assert!(!tracker.is_suppressed("w"));

        tracker.mark_pending("w", Origin::Remote);
        assert_eq!(tracker.state("w"), TagState::Pending(Origin::Remote));
        assert!(tracker.is_suppressed("w"));
        assert!(!tracker.acknowledge_echo("w"), "pending tags survive echoes");

        tracker.arm("w");
        assert_eq!(tracker.state("w"), TagState::Armed(Origin::Remote));
        assert!(tracker.is_suppressed("w"));
        assert!(!tracker.is_suppressed("other"));

        assert!(tracker.acknowledge_echo("w"));
        assert_eq!(tracker.state("w"), TagState::Untagged);
        assert!(!tracker.is_suppressed("w"));
    }

    #[test]
    fn armed_tags_expire_after_grace() {
        let tracker = ChangeOriginTracker::new(Duration::from_millis(20));
        tracker.mark_pending("w", Origin::session("s1"));
        tracker.arm("w");
        assert!(tracker.is_suppressed("w"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!tracker.is_suppressed("w"));
        assert_eq!(tracker.state("w"), TagState::Untagged);
    }

    #[test]
    fn local_file_tags_never_suppress() {
        let tracker = ChangeOriginTracker::new(Duration::from_secs(60));
        tracker.mark_pending("w", Origin::LocalFile);
        assert!(!tracker.is_suppressed("w"));
        assert_eq!(tracker.state("w"), TagState::Pending(Origin::LocalFile));

        tracker.clear("w");
        assert_eq!(tracker.state("w"), TagState::Untagged);
    }

    #[test]
    fn local_file_propagation_keeps_a_pending_echo() {
        let tracker = ChangeOriginTracker::new(Duration::from_secs(60));
        assert!(tracker.mark_pending("w", Origin::session("s1")));
        tracker.arm("w");

        assert!(!tracker.mark_pending("w", Origin::LocalFile));
        assert!(!tracker.clear_if("w", &Origin::LocalFile));
        assert_eq!(tracker.state("w"), TagState::Armed(Origin::session("s1")));
        assert!(tracker.is_suppressed("w"));
    }

    #[test]
    fn local_file_tag_is_replaced_by_engine_writes() {
        let tracker = ChangeOriginTracker::new(Duration::from_secs(60));
        assert!(tracker.mark_pending("w", Origin::LocalFile));
        assert!(tracker.mark_pending("w", Origin::Remote));
        assert_eq!(tracker.state("w"), TagState::Pending(Origin::Remote));
        assert!(tracker.clear_if("w", &Origin::Remote));
        assert_eq!(tracker.state("w"), TagState::Untagged);
    }

    #[test]
    fn expired_tags_are_swept_on_the_next_propagation() {
        let tracker = ChangeOriginTracker::new(Duration::from_millis(10));
        for id in ["a", "b", "c"] {
            tracker.mark_pending(id, Origin::Remote);
            tracker.arm(id);
        }
        std::thread::sleep(Duration::from_millis(30));

        tracker.mark_pending("d", Origin::Remote);
        let tags = tracker.tags();
        assert_eq!(tags.len(), 1);
        assert!(tags.contains_key("d"));
    }

    #[test]
    fn arming_without_a_tag_is_a_no_op() {
        let tracker = ChangeOriginTracker::new(Duration::from_secs(60));
        tracker.arm("w");
        assert_eq!(tracker.state("w"), TagState::Untagged);
    }
}
