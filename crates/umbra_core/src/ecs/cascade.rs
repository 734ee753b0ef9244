//! # Kill / Destroy Cascade
//!
//! Two-phase teardown, driven once per tick:
//!
//! ```text
//! tick(dt)
//!  ├─ 1. delayed kills   remaining -= dt; due ones become kill requests
//!  ├─ 2. kill passes     repeat until the kill queue is empty
//!  │      per entity: fire callbacks → detach parents → kill children
//!  │                  → request destroy → cancel delay
//!  └─ 3. destroy phase   scrub relations → component handlers → free ids
//! ```
//!
//! Callbacks other entities aimed at a dying entity survive the kill passes,
//! so an owner that dies later in the same tick still fires them. Whatever
//! is left is disposed unfired when the target is scrubbed.
//!
//! Each kill pass snapshots and clears the queue before processing, so
//! kills requested during a pass (children, callback commands) run in the
//! next pass of the same tick. A whole acyclic graph dies in one tick.
//!
//! Every request is idempotent. Asking to kill a dead or already dying
//! entity is a no-op, not an error.

use tracing::{debug, trace};

use super::component_set::AnyComponentSet;
use super::entity::Entity;
use super::entity_state::EntityStatePart;
use super::relations::{CallbackLink, Relations};
use crate::error::CoreResult;
use crate::memory::MemZone;
use crate::types::{Implements, IndexedType, Method, Proxy, TypeRegistry};

// =============================================================================
// Kill callback contract
// =============================================================================

/// Proxy contract for kill callbacks.
///
/// | ordinal | method    |
/// |---------|-----------|
/// | 0       | `on_kill` |
/// | 1       | `dispose` |
#[derive(Debug)]
pub struct KillCallback;

impl KillCallback {
    /// Ordinal of `on_kill`.
    pub const ON_KILL: usize = 0;
    /// Ordinal of `dispose`.
    pub const DISPOSE: usize = 1;
}

impl Proxy for KillCallback {
    const NAME: &'static str = "KillCallback";
    const METHOD_COUNT: usize = 2;
    type Args = KillCallbackArgs;
}

/// A follow-up a callback asks the cascade to perform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KillCommand {
    /// Kill an entity.
    Kill(Entity),
    /// Kill an entity after a delay in seconds.
    DelayKill(Entity, f32),
    /// Post a [`KillNotice`] for an entity.
    Notify {
        /// Entity the notice is addressed to.
        target: Entity,
        /// Caller-defined code.
        code: u32,
    },
}

/// Arguments passed to every [`KillCallback`] method.
#[derive(Debug)]
pub struct KillCallbackArgs {
    /// Entity being killed (or, for disposal of a watcher's callback, the
    /// target that died first).
    pub killed: Entity,
    /// Entity the callback reports to.
    pub target: Entity,
    commands: Vec<KillCommand>,
}

impl KillCallbackArgs {
    /// Creates arguments with no pending commands.
    #[must_use]
    pub fn new(killed: Entity, target: Entity) -> Self {
        Self {
            killed,
            target,
            commands: Vec::new(),
        }
    }

    /// Requests a kill.
    pub fn kill(&mut self, entity: Entity) {
        self.commands.push(KillCommand::Kill(entity));
    }

    /// Requests a delayed kill.
    pub fn delay_kill(&mut self, entity: Entity, delay: f32) {
        self.commands.push(KillCommand::DelayKill(entity, delay));
    }

    /// Posts a notice to `target`.
    pub fn notify(&mut self, target: Entity, code: u32) {
        self.commands.push(KillCommand::Notify { target, code });
    }

    /// Commands issued so far.
    #[must_use]
    pub fn commands(&self) -> &[KillCommand] {
        &self.commands
    }
}

/// Notice posted by a kill callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KillNotice {
    /// Entity whose death triggered the notice.
    pub killed: Entity,
    /// Entity the notice is addressed to.
    pub target: Entity,
    /// Caller-defined code.
    pub code: u32,
}

/// Convenience trait for kill callback values.
///
/// Implementing it provides `Implements<KillCallback>`; register the type
/// with `register_proxy::<T, KillCallback>()`.
pub trait OnKill: IndexedType {
    /// Called once when the owning entity is killed.
    fn on_kill(&mut self, args: &mut KillCallbackArgs);

    /// Called once before the callback's zone block is freed, whether or
    /// not `on_kill` ran.
    fn dispose(&mut self, args: &mut KillCallbackArgs) {
        let _ = args;
    }
}

impl<T: OnKill> Implements<KillCallback> for T {
    fn methods() -> Vec<Method<Self, KillCallback>> {
        vec![<T as OnKill>::on_kill, <T as OnKill>::dispose]
    }
}

// =============================================================================
// Tick report
// =============================================================================

/// Summary of one [`Cascade::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Kill passes run.
    pub kill_passes: u32,
    /// Entities killed.
    pub killed: u32,
    /// Entities destroyed.
    pub destroyed: u32,
    /// `on_kill` calls made.
    pub callbacks_fired: u32,
    /// Delayed kills that came due.
    pub delayed_promoted: u32,
}

/// Everything a tick touches outside the cascade itself.
pub struct TickContext<'a> {
    /// Delegate table for kill callbacks.
    pub registry: &'a TypeRegistry,
    /// Zone holding callbacks and components.
    pub zone: &'a mut MemZone,
    /// Id allocation.
    pub entities: &'a mut EntityStatePart,
    /// Component sets, indexed by type.
    pub sets: &'a mut [Option<Box<dyn AnyComponentSet>>],
    /// Dying members at which a set takes the bulk path.
    pub bulk_threshold: usize,
}

// =============================================================================
// Cascade
// =============================================================================

const PENDING_KILL: u8 = 1 << 0;
const KILLED: u8 = 1 << 1;
const PENDING_DESTROY: u8 = 1 << 2;

/// Queues, per-entity flags and the relation graph.
#[derive(Debug, Default)]
pub struct Cascade {
    kill_queue: Vec<Entity>,
    delayed: Vec<(Entity, f32)>,
    destroy_queue: Vec<Entity>,
    flags: Vec<u8>,
    relations: Relations,
    notices: Vec<KillNotice>,
    ticks: u64,
}

impl Cascade {
    /// Creates an empty cascade.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes ids `0..count` addressable.
    pub fn ensure_ids(&mut self, count: usize) {
        if self.flags.len() < count {
            self.flags.resize(count, 0);
        }
        self.relations.ensure_ids(count);
    }

    /// The relation graph.
    #[must_use]
    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    /// The relation graph, mutably.
    pub fn relations_mut(&mut self) -> &mut Relations {
        &mut self.relations
    }

    /// Number of queued kill requests.
    #[must_use]
    pub fn pending_kills(&self) -> usize {
        self.kill_queue.len()
    }

    /// Number of scheduled delayed kills.
    #[must_use]
    pub fn pending_delays(&self) -> usize {
        self.delayed.len()
    }

    /// Number of queued destroy requests.
    #[must_use]
    pub fn pending_destroys(&self) -> usize {
        self.destroy_queue.len()
    }

    /// Returns `true` if `entity` is queued to be killed or destroyed.
    #[must_use]
    pub fn is_dying(&self, entity: Entity) -> bool {
        self.flag(entity) != 0
    }

    /// Takes every notice posted so far.
    pub fn drain_notices(&mut self) -> Vec<KillNotice> {
        std::mem::take(&mut self.notices)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Queues a kill. Returns `false` if the entity is dead or already dying.
    pub fn request_kill(&mut self, entities: &EntityStatePart, entity: Entity) -> bool {
        if !entities.is_alive(entity) || self.is_dying(entity) {
            return false;
        }
        self.set_flag(entity, PENDING_KILL);
        self.kill_queue.push(entity);
        true
    }

    /// Schedules a kill after `delay` seconds.
    ///
    /// If one is already scheduled the shorter remaining delay wins.
    /// Returns `false` if the entity is dead or already dying, or if `delay`
    /// is NaN or infinite.
    pub fn request_delay_kill(&mut self, entities: &EntityStatePart, entity: Entity, delay: f32) -> bool {
        if !delay.is_finite() || !entities.is_alive(entity) || self.is_dying(entity) {
            return false;
        }
        match self.delayed.iter_mut().find(|(e, _)| *e == entity) {
            Some((_, remaining)) => *remaining = remaining.min(delay),
            None => self.delayed.push((entity, delay)),
        }
        true
    }

    /// Queues a hard destroy that skips kill callbacks.
    ///
    /// Returns `false` if the entity is dead or already queued for destroy.
    pub fn request_destroy(&mut self, entities: &EntityStatePart, entity: Entity) -> bool {
        if !entities.is_alive(entity) || self.flag(entity) & PENDING_DESTROY != 0 {
            return false;
        }
        self.set_flag(entity, PENDING_DESTROY);
        self.destroy_queue.push(entity);
        true
    }

    /// Drops every queue entry and relation of `entity` without running
    /// anything; used when an entity is destroyed outside a tick.
    pub fn forget(&mut self, entity: Entity) {
        self.kill_queue.retain(|&e| e != entity);
        self.delayed.retain(|&(e, _)| e != entity);
        self.destroy_queue.retain(|&e| e != entity);
        if let Some(flags) = self.flags.get_mut(entity.index()) {
            *flags = 0;
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Runs delayed kills, kill passes and the destroy phase.
    ///
    /// # Errors
    ///
    /// Propagates dispatch and zone errors; those are invariant violations.
    pub fn tick(&mut self, dt: f32, ctx: &mut TickContext<'_>) -> CoreResult<TickReport> {
        self.ticks += 1;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        let mut due = Vec::new();
        self.delayed.retain_mut(|(entity, remaining)| {
            *remaining -= dt;
            if *remaining <= 0.0 {
                due.push(*entity);
                false
            } else {
                true
            }
        });
        for entity in due {
            if self.request_kill(ctx.entities, entity) {
                report.delayed_promoted += 1;
            }
        }

        while !self.kill_queue.is_empty() {
            let batch = std::mem::take(&mut self.kill_queue);
            report.kill_passes += 1;
            for entity in batch {
                if ctx.entities.is_alive(entity) {
                    self.kill_one(entity, ctx, &mut report)?;
                }
            }
        }

        self.destroy_phase(ctx, &mut report)?;

        debug!(
            tick = report.tick,
            passes = report.kill_passes,
            killed = report.killed,
            destroyed = report.destroyed,
            callbacks = report.callbacks_fired,
            promoted = report.delayed_promoted,
            "cascade tick"
        );
        Ok(report)
    }

    fn kill_one(&mut self, entity: Entity, ctx: &mut TickContext<'_>, report: &mut TickReport) -> CoreResult<()> {
        let flags = self.flag(entity);
        self.set_flags(entity, (flags & !PENDING_KILL) | KILLED);
        trace!(entity = %entity, "killing");

        // 1. callbacks owned by the entity fire
        report.callbacks_fired += self.release_callbacks(entity, true, ctx)?;

        // 2 + 3. leave every parent, take every child down
        for parent in self.relations.parents.take(entity.id) {
            self.relations.children.remove_first(parent.id, &entity);
        }
        for child in self.relations.children.take(entity.id) {
            self.relations.parents.remove_first(child.id, &entity);
            self.request_kill(ctx.entities, child);
        }

        // 4. destroy at the end of this tick
        if self.flag(entity) & PENDING_DESTROY == 0 {
            self.set_flag(entity, PENDING_DESTROY);
            self.destroy_queue.push(entity);
        }

        // 5. an immediate kill pre-empts a scheduled one
        self.delayed.retain(|&(e, _)| e != entity);

        report.killed += 1;
        Ok(())
    }

    fn destroy_phase(&mut self, ctx: &mut TickContext<'_>, report: &mut TickReport) -> CoreResult<()> {
        let mut dying = std::mem::take(&mut self.destroy_queue);
        dying.retain(|&e| ctx.entities.is_alive(e));
        if dying.is_empty() {
            return Ok(());
        }

        for &entity in &dying {
            self.scrub(entity, ctx)?;
        }
        self.delayed.retain(|(e, _)| !dying.contains(e));

        let mut members = Vec::new();
        for set in ctx.sets.iter_mut().flatten() {
            if set.is_empty() {
                continue;
            }
            members.clear();
            members.extend(dying.iter().copied().filter(|&e| set.contains(ctx.zone, e)));
            if members.is_empty() {
                continue;
            }
            if members.len() >= ctx.bulk_threshold {
                set.destroy_bulk(ctx.zone, &members)?;
            } else {
                for &entity in &members {
                    set.destroy_single(ctx.zone, entity)?;
                }
            }
        }

        for entity in dying {
            if ctx.entities.destroy_entity(entity) {
                report.destroyed += 1;
            }
            if let Some(flags) = self.flags.get_mut(entity.index()) {
                *flags = 0;
            }
        }
        Ok(())
    }

    /// Removes every relation of `entity`, disposing callbacks unfired.
    ///
    /// # Errors
    ///
    /// Propagates dispatch and zone errors.
    pub fn scrub(&mut self, entity: Entity, ctx: &mut TickContext<'_>) -> CoreResult<()> {
        self.release_callbacks(entity, false, ctx)?;
        self.release_watched(entity, ctx)?;
        self.relations.detach(entity);
        debug_assert!(self.relations.is_clear(entity));
        Ok(())
    }

    /// Runs and frees every callback owned by `owner`. Returns how many fired.
    fn release_callbacks(&mut self, owner: Entity, fire: bool, ctx: &mut TickContext<'_>) -> CoreResult<u32> {
        let mut fired = 0;
        for link in self.relations.callbacks.take(owner.id) {
            self.relations.watchers.remove_first(link.target.id, &owner);
            let mut args = KillCallbackArgs::new(owner, link.target);
            if fire {
                ctx.registry
                    .invoke::<KillCallback>(ctx.zone, link.callback, KillCallback::ON_KILL, &mut args)?;
                fired += 1;
            }
            self.dispose_link(link, &mut args, ctx)?;
        }
        Ok(fired)
    }

    /// Disposes, unfired, callbacks other entities aimed at `target`.
    fn release_watched(&mut self, target: Entity, ctx: &mut TickContext<'_>) -> CoreResult<()> {
        for owner in self.relations.watchers.take(target.id) {
            let Some(link) = self
                .relations
                .callbacks
                .remove_first_by(owner.id, |link| link.target == target)
            else {
                continue;
            };
            let mut args = KillCallbackArgs::new(target, target);
            self.dispose_link(link, &mut args, ctx)?;
        }
        Ok(())
    }

    fn dispose_link(&mut self, link: CallbackLink, args: &mut KillCallbackArgs, ctx: &mut TickContext<'_>) -> CoreResult<()> {
        ctx.registry
            .invoke::<KillCallback>(ctx.zone, link.callback, KillCallback::DISPOSE, args)?;
        ctx.zone.free(link.callback.data)?;
        self.apply_commands(args, ctx.entities);
        Ok(())
    }

    fn apply_commands(&mut self, args: &mut KillCallbackArgs, entities: &EntityStatePart) {
        for command in args.commands.drain(..) {
            match command {
                KillCommand::Kill(entity) => {
                    self.request_kill(entities, entity);
                }
                KillCommand::DelayKill(entity, delay) => {
                    self.request_delay_kill(entities, entity, delay);
                }
                KillCommand::Notify { target, code } => self.notices.push(KillNotice {
                    killed: args.killed,
                    target,
                    code,
                }),
            }
        }
    }

    fn flag(&self, entity: Entity) -> u8 {
        self.flags.get(entity.index()).copied().unwrap_or(0)
    }

    fn set_flag(&mut self, entity: Entity, flag: u8) {
        let flags = self.flag(entity) | flag;
        self.set_flags(entity, flags);
    }

    fn set_flags(&mut self, entity: Entity, flags: u8) {
        let index = entity.index();
        if self.flags.len() <= index {
            self.flags.resize(index + 1, 0);
        }
        self.flags[index] = flags;
    }
}
