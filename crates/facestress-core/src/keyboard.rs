//! Keyboard convenience layer: Space analyzes, Escape stops the camera.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Analyze,
    StopCamera,
}

/// What the host knows at the moment a key arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortcutContext {
    pub trigger_enabled: bool,
    /// A text-entry control has input focus; Space belongs to it.
    pub text_input_focused: bool,
    pub camera_live: bool,
}

pub fn resolve(key: Key, ctx: ShortcutContext) -> Option<Shortcut> {
    match key {
        Key::Space if ctx.trigger_enabled && !ctx.text_input_focused => Some(Shortcut::Analyze),
        Key::Escape if ctx.camera_live => Some(Shortcut::StopCamera),
        _ => None,
    }
}
