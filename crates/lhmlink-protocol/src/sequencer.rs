use crate::messages::MessageId;

/// Tracks which message the conversation expects next.
///
/// Each peer keeps its own sequencer per direction. It only moves forward,
/// one step per message successfully sent or accepted, and stops at
/// [`MessageId::Null`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequencer {
    expected: MessageId,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            expected: MessageId::Connect,
        }
    }

    pub fn expected(&self) -> MessageId {
        self.expected
    }

    /// Whether every message in the conversation has been exchanged.
    pub fn is_finished(&self) -> bool {
        self.expected == MessageId::Null
    }

    /// Step to the next message in the order and return it.
    pub fn advance(&mut self) -> MessageId {
        self.expected = self.expected.next();
        self.expected
    }

    /// Start the conversation over from `Connect`.
    pub fn reset(&mut self) {
        self.expected = MessageId::Connect;
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_connect() {
        let seq = Sequencer::default();
        assert_eq!(seq.expected(), MessageId::Connect);
        assert!(!seq.is_finished());
    }

    #[test]
    fn advances_through_fixed_order() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.advance(), MessageId::Plugins);
        assert_eq!(seq.advance(), MessageId::Sensors);
        assert_eq!(seq.advance(), MessageId::Null);
        assert!(seq.is_finished());
    }

    #[test]
    fn null_is_terminal() {
        let mut seq = Sequencer::new();
        for _ in 0..10 {
            seq.advance();
        }
        assert_eq!(seq.expected(), MessageId::Null);
    }

    #[test]
    fn reset_returns_to_connect() {
        let mut seq = Sequencer::new();
        seq.advance();
        seq.advance();
        seq.reset();
        assert_eq!(seq.expected(), MessageId::Connect);
    }
}
