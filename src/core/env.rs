// src/core/env.rs
//! Environments as an arena of frames. Each frame links to its lexical
//! parent; slots are reused after a pop, so ids carry a generation stamp and
//! a stale id never resolves to a newer frame.

use std::collections::BTreeMap;

use crate::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Frame {
    parent: Option<FrameId>,
    vars: BTreeMap<String, Value>,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    frame: Option<Frame>,
}

#[derive(Debug)]
pub struct Environment {
    slots: Vec<Slot>,
    free: Vec<usize>,
    global: FrameId,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let global = FrameId { index: 0, generation: 0 };
        let slots = vec![Slot { generation: 0, frame: Some(Frame { parent: None, vars: BTreeMap::new() }) }];
        Self { slots, free: Vec::new(), global }
    }

    pub fn global(&self) -> FrameId {
        self.global
    }

    pub fn is_live(&self, id: FrameId) -> bool {
        self.frame(id).is_some()
    }

    /// Open a frame whose lexical parent is `parent`, or the global frame
    /// when `parent` has already been popped.
    pub fn push(&mut self, parent: FrameId) -> FrameId {
        let parent = if self.is_live(parent) { parent } else { self.global };
        let frame = Frame { parent: Some(parent), vars: BTreeMap::new() };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.frame = Some(frame);
                FrameId { index, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, frame: Some(frame) });
                FrameId { index: self.slots.len() - 1, generation: 0 }
            }
        }
    }

    pub fn pop(&mut self, id: FrameId) {
        if id == self.global || !self.is_live(id) {
            return;
        }
        self.slots[id.index].frame = None;
        self.free.push(id.index);
    }

    /// Declaration: binds (or rebinds) `name` in `id` itself.
    pub fn define(&mut self, id: FrameId, name: &str, value: Value) {
        if let Some(frame) = self.frame_mut(id) {
            frame.vars.insert(name.to_string(), value);
        }
    }

    /// Assignment: updates the nearest enclosing binding. False when the
    /// name is not declared anywhere on the chain.
    pub fn assign(&mut self, id: FrameId, name: &str, value: Value) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(frame) = self.frame_mut(current) else { return false };
            if let Some(slot) = frame.vars.get_mut(name) {
                *slot = value;
                return true;
            }
            cursor = frame.parent;
        }
        false
    }

    pub fn get(&self, id: FrameId, name: &str) -> Option<Value> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let frame = self.frame(current)?;
            if let Some(value) = frame.vars.get(name) {
                return Some(value.clone());
            }
            cursor = frame.parent;
        }
        None
    }

    /// Every binding visible from `id`; inner bindings shadow outer ones.
    pub fn visible(&self, id: FrameId) -> BTreeMap<String, Value> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(frame) = self.frame(current) else { break };
            chain.push(frame);
            cursor = frame.parent;
        }
        let mut out = BTreeMap::new();
        for frame in chain.into_iter().rev() {
            for (k, v) in &frame.vars {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// Bindings declared directly in `id`.
    pub fn locals(&self, id: FrameId) -> BTreeMap<String, Value> {
        self.frame(id).map(|f| f.vars.clone()).unwrap_or_default()
    }

    pub fn live_frames(&self) -> usize {
        self.slots.iter().filter(|s| s.frame.is_some()).count()
    }

    fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.slots.get(id.index).filter(|s| s.generation == id.generation).and_then(|s| s.frame.as_ref())
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.frame.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents_and_assign_updates_outer() {
        let mut env = Environment::new();
        let g = env.global();
        env.define(g, "x", Value::Number(1.0));
        let f = env.push(g);
        assert!(env.assign(f, "x", Value::Number(2.0)));
        assert!(!env.assign(f, "y", Value::Null));
        env.pop(f);
        assert!(matches!(env.get(g, "x"), Some(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn stale_ids_do_not_resolve_to_reused_slots() {
        let mut env = Environment::new();
        let g = env.global();
        let a = env.push(g);
        env.define(a, "v", Value::Bool(true));
        env.pop(a);
        let b = env.push(g);
        assert!(!env.is_live(a));
        assert!(env.get(a, "v").is_none());
        assert!(env.get(b, "v").is_none());
        assert_eq!(env.live_frames(), 2);
    }

    #[test]
    fn popped_parent_falls_back_to_global() {
        let mut env = Environment::new();
        let g = env.global();
        env.define(g, "k", Value::Number(7.0));
        let a = env.push(g);
        env.pop(a);
        let b = env.push(a);
        assert!(env.get(b, "k").is_some());
    }
}
