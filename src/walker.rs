//! Call-graph walker
//!
//! Visits every instruction reachable from an entry point by following call
//! instructions transitively, across plain methods and bound closures.
//!
//! Traversal uses an explicit frame stack. Two controls guarantee
//! termination on recursive call chains:
//!
//! - a hard depth ceiling (`max_depth`), checked before anything else;
//! - an optional memo set keyed by method identity, so each distinct method
//!   is walked at most once per top-level walk.
//!
//! Calls through a delegate `Invoke` are followed when the current frame is
//! bound to a receiver: the walker looks back for the field load that put the
//! delegate on the stack, reads that field from the receiver object, and
//! walks the closure stored there.

use crate::decoder::{CilDecoder, Instruction, InstructionDecoder};
use crate::error::DecodeError;
use crate::image::{Closure, Image, MethodId, MethodRef, ObjectId, Value};
use crate::opcode::codes;
use crate::types::{GenericContext, TypeRef};
use ahash::AHashSet;

#[cfg(feature = "logging")]
use tracing::trace;

/// Depth and memoization policy of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum number of frames on the stack
    pub max_depth: usize,
    /// Walk each method at most once
    pub memoize: bool,
}

impl WalkOptions {
    pub const fn new(max_depth: usize, memoize: bool) -> Self {
        Self { max_depth, memoize }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::new(1000, true)
    }
}

/// Where a walk starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// A method in a generic context
    Method {
        method: MethodId,
        generics: GenericContext,
    },
    /// A bound invocable
    Closure(Closure),
}

impl EntryPoint {
    /// A non-generic method.
    pub fn method(method: MethodId) -> Self {
        Self::Method {
            method,
            generics: GenericContext::default(),
        }
    }
}

impl From<Closure> for EntryPoint {
    fn from(closure: Closure) -> Self {
        Self::Closure(closure)
    }
}

/// One entry of the walker's visit stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub method: MethodId,
    pub generics: GenericContext,
    /// Bound instance, for closures and calls on the frame's own receiver
    pub receiver: Option<ObjectId>,
}

impl CallFrame {
    fn unbound(method: &MethodRef) -> Self {
        Self {
            method: method.id,
            generics: method.context(),
            receiver: None,
        }
    }
}

impl From<EntryPoint> for CallFrame {
    fn from(entry: EntryPoint) -> Self {
        match entry {
            EntryPoint::Method { method, generics } => Self {
                method,
                generics,
                receiver: None,
            },
            EntryPoint::Closure(closure) => Self {
                method: closure.method,
                generics: GenericContext::default(),
                receiver: closure.target,
            },
        }
    }
}

/// Counters collected during a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Frames pushed
    pub frames: usize,
    /// Instructions handed to the visitor
    pub instructions: usize,
    /// Calls not followed because the stack was full
    pub depth_cutoffs: usize,
    /// Calls not followed because the method was already walked
    pub memo_hits: usize,
    /// Deepest stack reached
    pub max_depth_reached: usize,
}

/// Callback invoked for every visited instruction.
pub trait InstructionVisitor {
    fn visit(&mut self, instruction: &Instruction);
}

impl<F> InstructionVisitor for F
where
    F: FnMut(&Instruction),
{
    fn visit(&mut self, instruction: &Instruction) {
        self(instruction)
    }
}

struct ActiveFrame {
    frame: CallFrame,
    /// Declaring type of the frame's method, instantiated
    owner: Option<TypeRef>,
    instructions: Vec<Instruction>,
    cursor: usize,
}

#[derive(Default)]
struct WalkState {
    stack: Vec<ActiveFrame>,
    visited: AHashSet<MethodId>,
    stats: WalkStats,
}

/// Interprocedural instruction walker.
pub struct CallGraphWalker<'a, D> {
    image: &'a Image,
    decoder: D,
    options: WalkOptions,
}

impl<'a> CallGraphWalker<'a, CilDecoder<'a>> {
    /// Walker decoding CIL bodies of `image`.
    pub fn new(image: &'a Image) -> Self {
        Self::with_decoder(image, CilDecoder::new(image))
    }
}

impl<'a, D: InstructionDecoder> CallGraphWalker<'a, D> {
    pub fn with_decoder(image: &'a Image, decoder: D) -> Self {
        Self {
            image,
            decoder,
            options: WalkOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn options(&self) -> WalkOptions {
        self.options
    }

    /// Walk from `entry`, handing every reachable instruction to `visitor`.
    pub fn walk<V>(&self, entry: impl Into<EntryPoint>, visitor: &mut V) -> Result<WalkStats, DecodeError>
    where
        V: InstructionVisitor + ?Sized,
    {
        let mut state = WalkState::default();
        self.enter(&mut state, CallFrame::from(entry.into()))?;

        loop {
            let Some(top) = state.stack.last_mut() else {
                break;
            };
            let index = top.cursor;
            if index >= top.instructions.len() {
                state.stack.pop();
                continue;
            }
            top.cursor += 1;

            let top = &*top;
            let instruction = &top.instructions[index];
            visitor.visit(instruction);
            let next = self.callee(top, index);
            state.stats.instructions += 1;

            if let Some(frame) = next {
                self.enter(&mut state, frame)?;
            }
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_validator",
            frames = state.stats.frames,
            instructions = state.stats.instructions,
            depth_cutoffs = state.stats.depth_cutoffs,
            memo_hits = state.stats.memo_hits,
            "Call graph walk complete"
        );

        Ok(state.stats)
    }

    fn enter(&self, state: &mut WalkState, frame: CallFrame) -> Result<(), DecodeError> {
        if state.stack.len() >= self.options.max_depth {
            state.stats.depth_cutoffs += 1;

            #[cfg(feature = "logging")]
            trace!(
                target: "dependency_validator",
                method = %frame.method,
                max_depth = self.options.max_depth,
                "Call depth limit reached"
            );

            return Ok(());
        }

        if self.options.memoize && !state.visited.insert(frame.method) {
            state.stats.memo_hits += 1;
            return Ok(());
        }

        let instructions = self.decoder.decode(frame.method, &frame.generics)?;
        let owner = self
            .image
            .method(frame.method)
            .map(|info| info.declaring_type.substitute(&frame.generics));

        state.stack.push(ActiveFrame {
            frame,
            owner,
            instructions,
            cursor: 0,
        });
        state.stats.frames += 1;
        state.stats.max_depth_reached = state.stats.max_depth_reached.max(state.stack.len());
        Ok(())
    }

    /// Frame to walk for the call at `index`, if any.
    fn callee(&self, current: &ActiveFrame, index: usize) -> Option<CallFrame> {
        let instruction = &current.instructions[index];
        if !instruction.opcode.is_call() {
            return None;
        }
        let method = instruction.method()?;
        // object creation never enters the constructor body
        if method.is_constructor {
            return None;
        }

        if method.declaring_type.is_delegate() {
            if let Some(receiver) = current.frame.receiver {
                return self
                    .bound_closure(current, index, method, receiver)
                    .map(|closure| CallFrame::from(EntryPoint::Closure(closure)));
            }
        }

        let on_own_receiver = !method.is_static
            && index > 0
            && current.instructions[index - 1].is(codes::LDARG_0);
        if on_own_receiver {
            return Some(CallFrame {
                receiver: current.frame.receiver,
                ..CallFrame::unbound(method)
            });
        }

        Some(CallFrame::unbound(method))
    }

    /// Closure stored in the receiver field that supplied the delegate being
    /// invoked at `index`.
    fn bound_closure(
        &self,
        current: &ActiveFrame,
        index: usize,
        invoke: &MethodRef,
        receiver: ObjectId,
    ) -> Option<Closure> {
        let owner = current.owner.as_ref()?;
        let field = current.instructions[..index]
            .iter()
            .rev()
            .filter_map(Instruction::field)
            .find(|field| field.field_type == invoke.declaring_type && &field.declaring_type == owner)?;

        match self.image.object(receiver)?.field(&field.name)? {
            Value::Closure(closure) => Some(*closure),
            _ => None,
        }
    }
}
