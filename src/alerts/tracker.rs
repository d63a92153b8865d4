use super::store::AlertEventStore;
use crate::db::models::NewAlertEvent;
use crate::services::LatestFrameResult;
use anyhow::Result;
use chrono::Utc;

/// What one poll did to the alert events of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened(i32),
    Updated(i32),
    Closed(i32),
    Idle,
}

/// Tracks the open alert event of one camera and alert type across polls.
///
/// Detections with no open event open one; detections with an open event
/// update it in place; an empty poll closes the open event. When a store
/// call fails the tracked state is left as it was, so the next poll retries.
#[derive(Debug)]
pub struct AlertTracker {
    camera_id: i32,
    alert_type: String,
    open_event: Option<i32>,
}

impl AlertTracker {
    pub fn new(camera_id: i32, alert_type: impl Into<String>) -> Self {
        Self {
            camera_id,
            alert_type: alert_type.into(),
            open_event: None,
        }
    }

    pub fn open_event(&self) -> Option<i32> {
        self.open_event
    }

    /// Continue an event left open by an earlier worker
    pub fn adopt(&mut self, event_id: i32) {
        self.open_event = Some(event_id);
    }

    pub async fn observe(
        &mut self,
        store: &dyn AlertEventStore,
        result: &LatestFrameResult,
    ) -> Result<Transition> {
        let annotation = result.ai_annotation_path.as_deref();

        if result.has_detections() {
            if let Some(event_id) = self.open_event {
                store.update(event_id, &result.detections, annotation).await?;
                return Ok(Transition::Updated(event_id));
            }

            let opened = store
                .open(NewAlertEvent {
                    camera_id: self.camera_id,
                    alert_type: self.alert_type.clone(),
                    start_time: Utc::now(),
                    detections: result.detections.clone(),
                    ai_annotation_path: result.ai_annotation_path.clone(),
                })
                .await;

            return match opened {
                Ok(event) => {
                    self.open_event = Some(event.id);
                    Ok(Transition::Opened(event.id))
                }
                Err(e) => match store.get_open(self.camera_id, &self.alert_type).await? {
                    // someone else holds the open event; continue it
                    Some(existing) => {
                        self.open_event = Some(existing.id);
                        store.update(existing.id, &result.detections, annotation).await?;
                        Ok(Transition::Updated(existing.id))
                    }
                    None => Err(e),
                },
            };
        }

        match self.open_event {
            Some(event_id) => {
                store.close(event_id, Utc::now()).await?;
                self.open_event = None;
                Ok(Transition::Closed(event_id))
            }
            None => Ok(Transition::Idle),
        }
    }

    /// Close the open event, if any
    pub async fn finish(&mut self, store: &dyn AlertEventStore) -> Result<Option<i32>> {
        match self.open_event {
            Some(event_id) => {
                store.close(event_id, Utc::now()).await?;
                self.open_event = None;
                Ok(Some(event_id))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::store::memory::{MemoryEventStore, StoreOp};
    use crate::db::models::Detection;

    fn frame(detections: Vec<Detection>, annotation: Option<&str>) -> LatestFrameResult {
        LatestFrameResult {
            detections,
            ai_annotation_path: annotation.map(str::to_string),
            ..LatestFrameResult::default()
        }
    }

    fn person() -> Vec<Detection> {
        vec![Detection::new("person", 0.88)]
    }

    #[tokio::test]
    async fn none_det_det_none_opens_updates_closes_once() {
        let store = MemoryEventStore::default();
        let mut tracker = AlertTracker::new(7, "human_detection");

        let transitions = vec![
            tracker.observe(&store, &frame(vec![], None)).await.unwrap(),
            tracker.observe(&store, &frame(person(), Some("/app/frames/7/a.jpg"))).await.unwrap(),
            tracker.observe(&store, &frame(person(), Some("/app/frames/7/b.jpg"))).await.unwrap(),
            tracker.observe(&store, &frame(vec![], None)).await.unwrap(),
        ];

        assert_eq!(
            transitions,
            vec![
                Transition::Idle,
                Transition::Opened(1),
                Transition::Updated(1),
                Transition::Closed(1)
            ]
        );
        assert_eq!(
            store.ops(),
            vec![StoreOp::Open(1), StoreOp::Update(1), StoreOp::Close(1)]
        );

        let event = &store.events()[0];
        assert!(event.end_time.is_some());
        assert_eq!(event.ai_annotation_path.as_deref(), Some("/app/frames/7/b.jpg"));
    }

    #[tokio::test]
    async fn adopted_event_is_updated_not_reopened() {
        let store = MemoryEventStore::default();
        let existing = store.seed_open(3, "human_detection");

        let mut tracker = AlertTracker::new(3, "human_detection");
        tracker.adopt(existing);

        let transition = tracker.observe(&store, &frame(person(), None)).await.unwrap();
        assert_eq!(transition, Transition::Updated(existing));
        assert_eq!(store.open_events().len(), 1);
    }

    #[tokio::test]
    async fn open_conflict_continues_the_existing_event() {
        let store = MemoryEventStore::default();
        let existing = store.seed_open(3, "human_detection");

        let mut tracker = AlertTracker::new(3, "human_detection");
        let transition = tracker.observe(&store, &frame(person(), None)).await.unwrap();

        assert_eq!(transition, Transition::Updated(existing));
        assert_eq!(tracker.open_event(), Some(existing));
        assert_eq!(store.open_events().len(), 1);
    }

    #[tokio::test]
    async fn loosely_shaped_detections_open_an_event() {
        let store = MemoryEventStore::default();
        let mut tracker = AlertTracker::new(5, "human_detection");

        let reply: LatestFrameResult = serde_json::from_value(serde_json::json!({
            "detections": [{
                "class_name": "person",
                "confidence": "0.9",
                "bbox": {"x1": 1, "y1": 2, "x2": 30, "y2": 40}
            }],
            "ai_annotation_path": "/app/frames/5/annotated.jpg"
        }))
        .unwrap();

        assert_eq!(tracker.observe(&store, &reply).await.unwrap(), Transition::Opened(1));
        let stored = store.events()[0].detection_results.clone().unwrap().0;
        assert_eq!(stored, reply.detections);
    }

    #[tokio::test]
    async fn finish_closes_the_open_event() {
        let store = MemoryEventStore::default();
        let mut tracker = AlertTracker::new(2, "human_detection");

        assert_eq!(tracker.finish(&store).await.unwrap(), None);
        tracker.observe(&store, &frame(person(), None)).await.unwrap();
        assert_eq!(tracker.finish(&store).await.unwrap(), Some(1));
        assert!(store.open_events().is_empty());
    }
}
