//! Call-stack frames
//!
//! A frame is one lexical/call scope's live state: variables, lambdas
//! captured by name, the return-value slot, error state for try/catch,
//! the object context, and the control-flow flags.

use super::defs::Method;
use super::value::{Object, Value};
use crate::diagnostics::ScriptError;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Control-flow and context flags
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameFlags {
    /// A `return` executed; unwinding to the owning invocation
    pub returning: bool,
    /// This frame was derived from a parent scope (loop body, branch,
    /// module body, fragment) rather than created by an invocation
    pub sub_frame: bool,
    /// `break` executed; consumed by the nearest enclosing loop
    pub loop_break: bool,
    /// `next` executed; consumed by the nearest enclosing loop
    pub loop_continue: bool,
    /// Inside `try`: raised errors are captured, not propagated
    pub in_try: bool,
    /// Set iff an object context is present
    pub in_object: bool,
}

/// One scope's live state during interpretation
#[derive(Debug, Default)]
pub struct Frame {
    pub vars: FxHashMap<String, Value>,
    pub lambdas: FxHashMap<String, Method>,
    pub return_value: Option<Value>,
    pub error: Option<ScriptError>,
    object: Option<Rc<RefCell<Object>>>,
    pub flags: FrameFlags,
}

impl Frame {
    /// Top-level script frame
    pub fn root() -> Self {
        Frame::default()
    }

    /// Inherited sub-frame: parent variables and lambdas copied by value,
    /// object context carried through. Used for loop bodies, branches,
    /// module bodies, catch bodies and synthetic fragments. Mutations stay
    /// local unless merged back at teardown.
    pub fn inherited(parent: &Frame) -> Self {
        let mut frame = Frame {
            vars: parent.vars.clone(),
            lambdas: parent.lambdas.clone(),
            ..Frame::default()
        };
        frame.flags.sub_frame = true;
        if let Some(object) = parent.object.clone() {
            frame.set_object(object);
        }
        frame
    }

    /// Isolated frame for a true method/lambda invocation: only bound
    /// parameters plus, when a receiver is present, its flattened
    /// instance variables.
    pub fn isolated(object: Option<Rc<RefCell<Object>>>) -> Self {
        let mut frame = Frame::default();
        if let Some(object) = object {
            for (name, value) in &object.borrow().fields {
                frame.vars.insert(name.clone(), value.clone());
            }
            frame.set_object(object);
        }
        frame
    }

    pub fn object(&self) -> Option<&Rc<RefCell<Object>>> {
        self.object.as_ref()
    }

    /// Install the object context; keeps `in_object` in sync.
    pub fn set_object(&mut self, object: Rc<RefCell<Object>>) {
        self.object = Some(object);
        self.flags.in_object = true;
    }

    /// Merge a finished child frame's variables into this one, but only
    /// for names this frame already declares. New names never leak upward.
    pub fn absorb(&mut self, child: &Frame) {
        for (name, value) in &child.vars {
            if self.vars.contains_key(name) {
                self.vars.insert(name.clone(), value.clone());
            }
        }
    }

    /// Keep a finished child frame's lambda definitions reachable. Lambda
    /// values travel by name, so a definition must outlive the frame that
    /// created it; generated names are unique, existing entries never clash.
    pub fn adopt_lambdas(&mut self, child: &Frame) {
        for (name, def) in &child.lambdas {
            if !self.lambdas.contains_key(name) {
                self.lambdas.insert(name.clone(), def.clone());
            }
        }
    }

    /// Write a finished isolated frame's variables back into the receiver
    /// object, for names the object already declares as instance variables.
    pub fn write_back_object(&self) {
        if let Some(object) = &self.object {
            let mut object = object.borrow_mut();
            let names: Vec<String> = object.fields.keys().cloned().collect();
            for name in names {
                if let Some(value) = self.vars.get(&name) {
                    object.fields[&name] = value.clone();
                }
            }
        }
    }

    /// Any flag set that should stop execution of the current body?
    pub fn interrupted(&self) -> bool {
        self.flags.returning || self.flags.loop_break || self.flags.loop_continue
    }
}
