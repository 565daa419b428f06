use uuid::Uuid;

/// Immutable correlation value threaded through call arguments so every
/// log line of one booking run can be tied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
    pub component: String,
}

impl RequestContext {
    pub fn new(component: impl Into<String>) -> RequestContext {
        RequestContext { correlation_id: Uuid::new_v4().to_string(), component: component.into() }
    }

    /// Same correlation id, different component label.
    pub fn child(&self, component: impl Into<String>) -> RequestContext {
        RequestContext { correlation_id: self.correlation_id.clone(), component: component.into() }
    }

    /// Short prefix for log lines.
    pub fn tag(&self) -> String {
        format!("[{}/{}]", &self.correlation_id[..8.min(self.correlation_id.len())], self.component)
    }
}
