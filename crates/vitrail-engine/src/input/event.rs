use super::keys::Key;

/// One key press or release, as delivered to a root content.
///
/// Carries the key twice: `hardware_key` is the physical position
/// (layout-independent, for WASD-style bindings), `layout_key` is what the
/// active keyboard layout says the key means (for mnemonic shortcuts).
#[derive(Debug)]
pub struct KeyEvent {
    pub hardware_key: Key,
    pub layout_key: Key,

    /// True for OS auto-repeat of a held key.
    pub repeated: bool,

    continue_processing: bool,
}

impl KeyEvent {
    pub(crate) fn new(hardware_key: Key, layout_key: Key, repeated: bool) -> Self {
        Self {
            hardware_key,
            layout_key,
            repeated,
            continue_processing: true,
        }
    }

    /// Marks the event as fully handled; later consumers in the dispatch
    /// chain will not see it.
    pub fn stop_processing(&mut self) {
        self.continue_processing = false;
    }

    pub fn continue_processing(&self) -> bool {
        self.continue_processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_start_unconsumed() {
        let event = KeyEvent::new(Key::A, Key::Q, false);
        assert!(event.continue_processing());
        assert_eq!(event.hardware_key, Key::A);
        assert_eq!(event.layout_key, Key::Q);
        assert!(!event.repeated);
    }

    #[test]
    fn stop_processing_sticks() {
        let mut event = KeyEvent::new(Key::Escape, Key::Escape, false);
        event.stop_processing();
        assert!(!event.continue_processing());
    }
}
