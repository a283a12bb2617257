//! Configuration-changed signalling
//!
//! Every accepted property change bumps `vendor.display.timeline`, which the
//! composer polls, and is also published to in-process subscribers.

use crate::properties::{DisplayType, PropertyStore, TIMELINE_KEY};
use crate::Result;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

/// Which setting a change touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Resolution,
    Mode3d,
    Brightness,
    Contrast,
    Saturation,
    Hue,
    ColorMode,
    HdrMode,
    Overscan,
    Gamma,
}

/// Published after the timeline property has been bumped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChanged {
    pub timeline: i64,
    pub display: DisplayType,
    pub attribute: Attribute,
}

#[derive(Debug, Default)]
pub struct Timeline {
    subscribers: Vec<Sender<ConfigChanged>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ConfigChanged> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Increment the timeline property and notify subscribers
    pub fn bump(
        &mut self,
        props: &dyn PropertyStore,
        dpy: DisplayType,
        attribute: Attribute,
    ) -> Result<i64> {
        let timeline = props.get_int(TIMELINE_KEY, 1) + 1;
        props.set(TIMELINE_KEY, &timeline.to_string())?;
        debug!(timeline, display = ?dpy, ?attribute, "display timeline bumped");

        let event = ConfigChanged {
            timeline,
            display: dpy,
            attribute,
        };
        // Drop subscribers whose receiver is gone
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::MemoryProperties;

    #[test]
    fn test_bump_starts_from_one() {
        let props = MemoryProperties::new();
        let mut timeline = Timeline::new();
        assert_eq!(timeline.bump(&props, DisplayType::Primary, Attribute::Hue).unwrap(), 2);
        assert_eq!(timeline.bump(&props, DisplayType::Primary, Attribute::Hue).unwrap(), 3);
        assert_eq!(props.get(TIMELINE_KEY).as_deref(), Some("3"));
    }

    #[test]
    fn test_subscribers_receive_events() {
        let props = MemoryProperties::new().with(TIMELINE_KEY, "41");
        let mut timeline = Timeline::new();
        let rx = timeline.subscribe();
        let dropped = timeline.subscribe();
        drop(dropped);

        timeline.bump(&props, DisplayType::External, Attribute::Overscan).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ConfigChanged {
                timeline: 42,
                display: DisplayType::External,
                attribute: Attribute::Overscan,
            }
        );
        assert_eq!(timeline.subscribers.len(), 1);
    }
}
