//! Named state graph with immediate and cross-faded transitions

use super::pose::{BlendMode, PoseBuffer};
use super::state::ClipState;
use super::{Model, Skeleton};
use std::collections::HashMap;

/// A node of the state graph
#[derive(Clone, Debug)]
pub enum AnimNode {
    Clip(ClipState),
    Machine(Box<StateMachine>),
}

impl AnimNode {
    fn enter(&mut self, model: &Model) {
        match self {
            AnimNode::Clip(state) => state.enter(model),
            AnimNode::Machine(machine) => machine.enter(model),
        }
    }

    fn exit(&mut self) {
        match self {
            AnimNode::Clip(state) => state.exit(),
            AnimNode::Machine(machine) => machine.exit(),
        }
    }

    fn update(&mut self, dt: f32, model: &Model) {
        match self {
            AnimNode::Clip(state) => state.update(dt),
            AnimNode::Machine(machine) => machine.update(dt, model),
        }
    }

    fn evaluate(
        &self,
        joint: usize,
        pose: &mut PoseBuffer,
        weight: f32,
        mode: BlendMode,
        skeleton: &Skeleton,
    ) {
        match self {
            AnimNode::Clip(state) => state.evaluate(joint, pose, weight, mode, skeleton),
            AnimNode::Machine(machine) => machine.evaluate_joint(joint, pose, weight, mode, skeleton),
        }
    }

    /// Duration of the clip this node is playing, in seconds
    pub fn duration_seconds(&self) -> f32 {
        match self {
            AnimNode::Clip(state) => state.duration_seconds(),
            AnimNode::Machine(machine) => machine.duration_seconds(),
        }
    }

    pub fn progress(&self) -> f32 {
        match self {
            AnimNode::Clip(state) => state.progress(),
            AnimNode::Machine(machine) => machine.progress(),
        }
    }
}

/// A requested change of the current state
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub target: String,
    /// Cross-fade length as a fraction of the target clip's duration
    pub duration_fraction: f32,
}

/// State graph driving one layer.
///
/// Before the first transition the machine sits in an implicit entry
/// state that produces no animation. At most one transition request is
/// held between updates: the first one wins and later ones are dropped.
#[derive(Clone, Debug, Default)]
pub struct StateMachine {
    names: Vec<String>,
    nodes: Vec<AnimNode>,
    lookup: HashMap<String, usize>,
    current: Option<usize>,
    previous: Option<usize>,
    pending: Option<Transition>,
    elapsed: f32,
    transition_duration: f32,
    entry_state: Option<String>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// State played whenever this machine is entered as a sub-machine
    pub fn with_entry_state(mut self, name: impl Into<String>) -> Self {
        self.entry_state = Some(name.into());
        self
    }

    /// Add a node, replacing any node with the same name
    pub fn add_node(&mut self, name: impl Into<String>, node: AnimNode) -> usize {
        let name = name.into();
        if let Some(&index) = self.lookup.get(&name) {
            log::debug!("Replacing state '{}'", name);
            if self.current == Some(index) || self.previous == Some(index) {
                self.nodes[index].exit();
                if self.current == Some(index) {
                    self.current = None;
                }
                if self.previous == Some(index) {
                    self.previous = None;
                }
            }
            self.nodes[index] = node;
            return index;
        }

        let index = self.nodes.len();
        self.lookup.insert(name.clone(), index);
        self.names.push(name);
        self.nodes.push(node);
        index
    }

    pub fn add_state(&mut self, name: impl Into<String>, state: ClipState) -> usize {
        self.add_node(name, AnimNode::Clip(state))
    }

    pub fn add_sub_machine(&mut self, name: impl Into<String>, machine: StateMachine) -> usize {
        self.add_node(name, AnimNode::Machine(Box::new(machine)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, name: &str) -> Option<&AnimNode> {
        self.lookup.get(name).map(|&index| &self.nodes[index])
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut AnimNode> {
        self.lookup.get(name).map(|&index| &mut self.nodes[index])
    }

    /// Nested machine by name, for driving its own transitions
    pub fn sub_machine_mut(&mut self, name: &str) -> Option<&mut StateMachine> {
        match self.node_mut(name)? {
            AnimNode::Machine(machine) => Some(machine),
            AnimNode::Clip(_) => None,
        }
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current.map(|index| self.names[index].as_str())
    }

    pub fn previous_state(&self) -> Option<&str> {
        self.previous.map(|index| self.names[index].as_str())
    }

    pub fn current_node(&self) -> Option<&AnimNode> {
        self.current.map(|index| &self.nodes[index])
    }

    pub fn current_node_mut(&mut self) -> Option<&mut AnimNode> {
        self.current.map(|index| &mut self.nodes[index])
    }

    pub fn pending(&self) -> Option<&Transition> {
        self.pending.as_ref()
    }

    /// Switch to `name` on the next update
    pub fn play(&mut self, name: &str) {
        self.request(Transition {
            target: name.to_string(),
            duration_fraction: 0.0,
        });
    }

    /// Cross-fade to `name` over a fraction of its clip duration
    pub fn cross_fade(&mut self, name: &str, duration_fraction: f32) {
        self.request(Transition {
            target: name.to_string(),
            duration_fraction,
        });
    }

    pub fn request(&mut self, transition: Transition) {
        if let Some(pending) = &self.pending {
            log::trace!(
                "Dropping transition to '{}', '{}' already pending",
                transition.target,
                pending.target
            );
            return;
        }
        self.pending = Some(transition);
    }

    /// True while the previous state is still fading out
    pub fn is_transitioning(&self) -> bool {
        self.previous.is_some() && self.elapsed < self.transition_duration
    }

    /// Blend factor of the current state, 1.0 outside transitions
    pub fn transition_alpha(&self) -> f32 {
        if self.is_transitioning() {
            self.elapsed / self.transition_duration
        } else {
            1.0
        }
    }

    /// Transition length in seconds resolved at the last state change
    pub fn transition_duration(&self) -> f32 {
        self.transition_duration
    }

    /// True when a state (not the implicit entry state) is current
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.current_node().map(|node| node.duration_seconds()).unwrap_or(0.0)
    }

    /// Normalized playback position of the current state
    pub fn progress(&self) -> f32 {
        self.current_node().map(|node| node.progress()).unwrap_or(0.0)
    }

    /// Resolve the pending transition, then advance the active states
    pub fn update(&mut self, dt: f32, model: &Model) {
        if let Some(transition) = self.pending.take() {
            self.begin_transition(transition, model);
        }

        self.elapsed += dt;

        if let Some(current) = self.current {
            self.nodes[current].update(dt, model);
        }

        if let Some(previous) = self.previous {
            if self.elapsed < self.transition_duration {
                self.nodes[previous].update(dt, model);
            } else {
                self.nodes[previous].exit();
                self.previous = None;
                log::trace!("Cross-fade into '{}' complete", self.current_state().unwrap_or("<entry>"));
            }
        }
    }

    fn begin_transition(&mut self, transition: Transition, model: &Model) {
        let Some(&target) = self.lookup.get(&transition.target) else {
            log::debug!("Ignoring transition to unknown state '{}'", transition.target);
            return;
        };
        if self.current == Some(target) {
            return;
        }

        // Superseding a running cross-fade drops the state fading out
        if let Some(previous) = self.previous.take() {
            self.nodes[previous].exit();
        }
        self.previous = self.current;
        self.current = Some(target);
        self.nodes[target].enter(model);

        self.elapsed = 0.0;
        self.transition_duration =
            transition.duration_fraction.max(0.0) * self.nodes[target].duration_seconds();

        log::debug!(
            "Transition '{}' -> '{}' over {:.3}s",
            self.previous_state().unwrap_or("<entry>"),
            transition.target,
            self.transition_duration
        );
    }

    /// Accumulate the active state(s) for one joint into the pose
    pub fn evaluate_joint(
        &self,
        joint: usize,
        pose: &mut PoseBuffer,
        weight: f32,
        mode: BlendMode,
        skeleton: &Skeleton,
    ) {
        let Some(current) = self.current else {
            return;
        };

        match self.previous.filter(|_| self.is_transitioning()) {
            Some(previous) => {
                let alpha = self.transition_alpha();
                self.nodes[previous].evaluate(joint, pose, (1.0 - alpha) * weight, mode, skeleton);
                self.nodes[current].evaluate(joint, pose, alpha * weight, mode, skeleton);
            }
            None => self.nodes[current].evaluate(joint, pose, weight, mode, skeleton),
        }
    }

    /// Entered as a sub-machine: start the queued or entry state immediately
    fn enter(&mut self, model: &Model) {
        let transition = self.pending.take().or_else(|| {
            self.entry_state.clone().map(|target| Transition {
                target,
                duration_fraction: 0.0,
            })
        });
        if let Some(transition) = transition {
            self.begin_transition(transition, model);
        }
    }

    /// Exit every active state and return to the implicit entry state
    pub fn exit(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.nodes[previous].exit();
        }
        if let Some(current) = self.current.take() {
            self.nodes[current].exit();
        }
        self.pending = None;
        self.elapsed = 0.0;
        self.transition_duration = 0.0;
    }
}
