//! Control-parameter routing bus.
//!
//! The bus maps named controls to any number of (voice, parameter) targets.
//! An update clamps the incoming value to [0, 1] and fans it out through the
//! targets' atomic parameters, so a single controller gesture can retune many
//! voices without ever touching the audio thread.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::voice::VoiceControls;
use crate::types::VoiceId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ControlTarget {
    voice: VoiceId,
    param: String,
}

/// Registry of voice controls plus the control → target routing table.
///
/// Lives entirely in the control context; delivery to voices happens through
/// their shared atomic parameters.
#[derive(Debug, Default)]
pub struct ControlBus {
    links: HashMap<String, Vec<ControlTarget>>,
    voices: HashMap<VoiceId, Arc<VoiceControls>>,
    names: HashMap<String, VoiceId>,
}

impl ControlBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_voice(&mut self, id: VoiceId, name: Option<String>, controls: Arc<VoiceControls>) {
        self.voices.insert(id, controls);
        if let Some(name) = name {
            if let Some(previous) = self.names.insert(name.clone(), id) {
                log::warn!("voice name '{name}' reassigned from {previous} to {id}");
            }
        }
    }

    pub fn remove_voice(&mut self, id: VoiceId) {
        self.voices.remove(&id);
        self.names.retain(|_, v| *v != id);
        for targets in self.links.values_mut() {
            targets.retain(|t| t.voice != id);
        }
    }

    pub fn clear_voices(&mut self) {
        self.voices.clear();
        self.names.clear();
        self.links.clear();
    }

    pub fn controls(&self, id: VoiceId) -> Option<&Arc<VoiceControls>> {
        self.voices.get(&id)
    }

    pub fn lookup(&self, name: &str) -> Option<VoiceId> {
        self.names.get(name).copied()
    }

    /// Route `control` to the named parameter of a voice. Linking the same
    /// target twice is a no-op, so re-running a song's link table is safe.
    pub fn link(&mut self, control: &str, voice: VoiceId, param: &str) {
        if !self.voices.contains_key(&voice) {
            log::warn!("cannot link '{control}': {voice} is not registered");
            return;
        }
        let target = ControlTarget {
            voice,
            param: param.to_string(),
        };
        let targets = self.links.entry(control.to_string()).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    pub fn unlink(&mut self, control: &str, voice: VoiceId, param: &str) {
        if let Some(targets) = self.links.get_mut(control) {
            targets.retain(|t| !(t.voice == voice && t.param == param));
        }
    }

    /// Deliver a control value to every linked target. The value is clamped
    /// to the bus convention [0, 1]; each parameter re-clamps to its own
    /// range on store. Unknown controls are ignored.
    pub fn update(&self, control: &str, value: f32) {
        let Some(targets) = self.links.get(control) else {
            return;
        };
        let value = value.clamp(0.0, 1.0);
        for target in targets {
            if let Some(controls) = self.voices.get(&target.voice) {
                controls.set(&target.param, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with_voices(n: u64) -> (ControlBus, Vec<Arc<VoiceControls>>) {
        let mut bus = ControlBus::new();
        let mut all = Vec::new();
        for i in 0..n {
            let controls = Arc::new(VoiceControls::new());
            bus.add_voice(VoiceId(i), Some(format!("v{i}")), Arc::clone(&controls));
            all.push(controls);
        }
        (bus, all)
    }

    #[test]
    fn update_fans_out_to_every_linked_voice() {
        let (mut bus, controls) = bus_with_voices(3);
        for i in 0..3 {
            bus.link("intensity", VoiceId(i), "velocity");
        }
        bus.update("intensity", 0.7);
        for c in &controls {
            assert!((c.velocity.get() - 0.7).abs() < 1e-6);
        }
    }

    #[test]
    fn update_clamps_to_unit_range() {
        let (mut bus, controls) = bus_with_voices(1);
        bus.link("intensity", VoiceId(0), "velocity");
        bus.update("intensity", 4.2);
        assert_eq!(controls[0].velocity.get(), 1.0);
        bus.update("intensity", -1.0);
        assert_eq!(controls[0].velocity.get(), 0.0);
    }

    #[test]
    fn unknown_control_is_ignored() {
        let (bus, controls) = bus_with_voices(1);
        bus.update("nothing", 0.5);
        assert_eq!(controls[0].velocity.get(), 1.0);
    }

    #[test]
    fn duplicate_link_delivers_once() {
        let (mut bus, controls) = bus_with_voices(1);
        bus.link("gate", VoiceId(0), "gate");
        bus.link("gate", VoiceId(0), "gate");
        assert_eq!(bus.links["gate"].len(), 1);
        bus.update("gate", 1.0);
        assert!(controls[0].gate_on());
    }

    #[test]
    fn removed_voice_stops_receiving() {
        let (mut bus, controls) = bus_with_voices(2);
        bus.link("intensity", VoiceId(0), "velocity");
        bus.link("intensity", VoiceId(1), "velocity");
        bus.remove_voice(VoiceId(0));
        bus.update("intensity", 0.3);
        assert_eq!(controls[0].velocity.get(), 1.0);
        assert!((controls[1].velocity.get() - 0.3).abs() < 1e-6);
        assert!(bus.lookup("v0").is_none());
        assert_eq!(bus.lookup("v1"), Some(VoiceId(1)));
    }

    #[test]
    fn link_to_unregistered_voice_is_refused() {
        let (mut bus, _) = bus_with_voices(1);
        bus.link("x", VoiceId(99), "velocity");
        assert!(bus.links.get("x").is_none());
    }
}
