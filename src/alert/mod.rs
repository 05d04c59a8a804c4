pub mod engine;
pub mod rules;
pub mod sink;
pub mod template;

pub use engine::{evaluate_notifications, Notification};
pub use rules::{deadline_due, within_window, NotificationKind};
pub use sink::{Notifier, SlackSink, StdoutSink, WebhookSink};
pub use template::{MessageTemplate, TemplateError, TemplateKind, Templates};
