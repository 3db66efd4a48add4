use biblio_llm::{StreamTarget, TurnId};

/// Stable identifier for one transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Transcript speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    /// Model placeholder still receiving chunks for the given turn.
    Streaming(TurnId),
    Done,
    /// The text holds the user-facing failure; the payload keeps the cause.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(id: MessageId, role: Role, text: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            status,
        }
    }

    /// Creates the empty model entry that chunks are appended to.
    pub fn model_placeholder(id: MessageId, turn_id: TurnId) -> Self {
        Self::new(id, Role::Model, String::new(), MessageStatus::Streaming(turn_id))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming(_))
    }

    /// True while the placeholder has not received its first chunk.
    pub fn is_awaiting_first_chunk(&self) -> bool {
        self.is_streaming() && self.text.is_empty()
    }
}

/// Stream lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamTarget),
    Done(StreamTarget),
    Failed {
        target: StreamTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream,
    TargetMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    /// Returns the active target if and only if the state is `Streaming`.
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Done(_) | Self::Failed { .. } => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active_target().is_some()
    }

    /// Returns true when incoming stream data belongs to the active turn.
    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if *active == target)
    }

    /// Applies one transition.
    ///
    /// Any non-streaming state may start a new turn. Terminal transitions must name the
    /// active target exactly. Starting while streaming is always rejected, even for the
    /// same target, because a turn is sent at most once.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(target) => match self {
                Self::Streaming(active) => Err(StreamTransitionRejection::AlreadyStreaming {
                    active: *active,
                    attempted: target,
                }),
                Self::Idle | Self::Done(_) | Self::Failed { .. } => Ok(Self::Streaming(target)),
            },
            StreamTransition::Complete(target) => {
                self.require_active(target).map(|_| Self::Done(target))
            }
            StreamTransition::Fail { target, message } => self
                .require_active(target)
                .map(|_| Self::Failed { target, message }),
        }
    }

    fn require_active(&self, target: StreamTarget) -> Result<(), StreamTransitionRejection> {
        match self {
            Self::Streaming(active) if *active == target => Ok(()),
            Self::Streaming(active) => Err(StreamTransitionRejection::TargetMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Done(_) | Self::Failed { .. } => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}
