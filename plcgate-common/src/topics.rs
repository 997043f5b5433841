//! Topic builders for mirrored entities and discovery announcements.
//!
//! Entity topics follow the pattern:
//! `<prefix>/<group>/<module>-<slot>/<suffix>`

/// Default topic prefix for mirrored entities.
pub const TOPIC_PREFIX: &str = "plc";

/// Default availability topic.
pub const AVAILABILITY_TOPIC: &str = "plc/availability";

/// Default discovery prefix used by Home Assistant.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Payload announcing the device as reachable.
pub const PAYLOAD_ONLINE: &str = "online";

/// Payload announcing the device as unreachable.
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Builder for entity base topics.
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    prefix: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(TOPIC_PREFIX)
    }
}

impl TopicBuilder {
    /// Create a builder with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the base topic of one entity.
    ///
    /// # Example
    /// ```
    /// use plcgate_common::topics::TopicBuilder;
    ///
    /// let builder = TopicBuilder::new("plc");
    /// assert_eq!(builder.entity_base("di", 9, 8), "plc/di/2-2");
    /// ```
    pub fn entity_base(&self, group: &str, index: usize, slot_size: usize) -> String {
        format!("{}/{}/{}", self.prefix, group, coordinate(index, slot_size))
    }

    /// Build a single-level wildcard subscription for one suffix of a group.
    ///
    /// # Example
    /// ```
    /// use plcgate_common::topics::TopicBuilder;
    ///
    /// let builder = TopicBuilder::new("plc");
    /// assert_eq!(builder.group_wildcard("do", "set"), "plc/do/+/set");
    /// ```
    pub fn group_wildcard(&self, group: &str, suffix: &str) -> String {
        format!("{}/{}/+/{}", self.prefix, group, suffix)
    }
}

/// Human-friendly `<module>-<slot>` coordinate, both 1-based.
///
/// A slot size of zero is treated as one.
pub fn coordinate(index: usize, slot_size: usize) -> String {
    let slot_size = slot_size.max(1);
    format!("{}-{}", index / slot_size + 1, index % slot_size + 1)
}

/// Append a suffix to a base topic.
pub fn join(base: &str, suffix: &str) -> String {
    format!("{}/{}", base, suffix)
}

/// Build the discovery config topic of one entity.
///
/// # Example
/// ```
/// use plcgate_common::topics::discovery_topic;
///
/// assert_eq!(
///     discovery_topic("homeassistant", "light", "plc", "kitchen_do"),
///     "homeassistant/light/plc/kitchen_do/config"
/// );
/// ```
pub fn discovery_topic(prefix: &str, component: &str, node_id: &str, unique_id: &str) -> String {
    format!("{}/{}/{}/{}/config", prefix, component, node_id, unique_id)
}

/// Turn free text into a lowercase identifier made of `[a-z0-9_]`.
///
/// Runs of other characters collapse into one underscore; leading and
/// trailing underscores are dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builder() {
        let builder = TopicBuilder::default();

        assert_eq!(builder.entity_base("di", 0, 8), "plc/di/1-1");
        assert_eq!(builder.entity_base("di", 7, 8), "plc/di/1-8");
        assert_eq!(builder.entity_base("di", 8, 8), "plc/di/2-1");
        assert_eq!(builder.entity_base("blind", 5, 4), "plc/blind/2-2");
    }

    #[test]
    fn test_coordinate_zero_slot() {
        assert_eq!(coordinate(3, 0), "4-1");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kitchen Light"), "kitchen_light");
        assert_eq!(slugify("  Hall -- Lamp #2 "), "hall_lamp_2");
        assert_eq!(slugify("Żółw"), "w");
        assert_eq!(slugify("ŻÓŁ"), "");
        assert_eq!(slugify("do"), "do");
    }
}
