use crate::ui::UiEvent;

/// Source marker for events that do not belong to a network.
pub const UI_SOURCE: &str = "*";

#[derive(Debug)]
pub enum Payload {
    Ui(UiEvent),
    /// A parsed line from a network.
    Message(irc::proto::Message),
    /// A freshly connected session handed over by its network task.
    Session(Box<data::Session>),
    /// A status line queued from outside the orchestrator.
    Status(data::Line),
    /// Raw traffic for the debug view.
    Raw { line: String, outgoing: bool },
    /// The network task lost its connection (or the UI wants out).
    Closed,
}

/// One unit of work for the orchestrator: which source produced it and
/// what it carries. Events from one source stay in order.
#[derive(Debug)]
pub struct AppEvent {
    pub source: String,
    pub payload: Payload,
}

impl AppEvent {
    pub fn ui(payload: UiEvent) -> Self {
        Self {
            source: UI_SOURCE.to_string(),
            payload: Payload::Ui(payload),
        }
    }

    pub fn from_net(source: &str, payload: Payload) -> Self {
        Self {
            source: source.to_string(),
            payload,
        }
    }
}
