// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


use std::marker::PhantomData;
use crate::error::LinkError;
use crate::link::{Channel, Poll, Role};
use crate::protocol::*;
use crate::recognizer::{Outcome, Recognizer};
use crate::timer::Timer;

// ============================================================================
// States
// ============================================================================

// Transmitter, connection set up
pub struct SendSet;
pub struct AwaitUa;

// Receiver, connection set up
pub struct AwaitSet;
pub struct SendUa;

// Transmitter, teardown
pub struct SendDisc;
pub struct AwaitDisc;
pub struct SendFinalUa;

// Receiver, teardown
pub struct AwaitPeerDisc;
pub struct ReplyDisc;
pub struct AwaitFinalUa;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct LinkFsm<State> {
    state: PhantomData<State>,
    channel: Channel,
    recognizer: Recognizer,
    timer: Timer,
    attempts: u32,
}

// ============================================================================
// Trait
// ============================================================================

pub enum Step {
    Next(Box<dyn LinkState>),
    Done(Channel),
}

pub trait LinkState: Send {
    fn step(self: Box<Self>) -> Result<Step, LinkError>;
}

enum Wait {
    Accepted,
    Pending,
    Expired,
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S: 'static> LinkFsm<S> {
    fn start(channel: Channel, recognizer: Recognizer) -> Box<LinkFsm<S>> {
        Box::new(LinkFsm {
            state: PhantomData,
            channel,
            recognizer,
            timer: Timer::new(),
            attempts: 0,
        })
    }

    fn transition<T>(self) -> Box<LinkFsm<T>> {
        Box::new(LinkFsm {
            state: PhantomData,
            channel: self.channel,
            recognizer: self.recognizer,
            timer: self.timer,
            attempts: self.attempts,
        })
    }

    fn stay(self: Box<Self>) -> Result<Step, LinkError>
    where
        LinkFsm<S>: LinkState,
    {
        Ok(Step::Next(self))
    }

    fn state_name() -> &'static str {
        let type_name = std::any::type_name::<S>();
        type_name.split("::").last().unwrap_or(type_name)
    }

    /// Write a supervisory frame and start waiting for `answer`.
    fn send_and_arm(&mut self, control: u8, answer: u8) -> Result<(), LinkError> {
        self.attempts += 1;
        if self.attempts > 1 {
            self.channel.stats.retransmissions += 1;
        }

        self.channel.send_supervisory(control)?;
        self.recognizer = Recognizer::supervisory(answer);
        self.timer.arm(self.channel.config.timeout);
        Ok(())
    }

    fn wait(&mut self) -> Result<Wait, LinkError> {
        match self.channel.poll(&mut self.timer)? {
            Poll::Byte(byte) => match self.recognizer.feed(byte) {
                Outcome::Accepted(control) => {
                    self.timer.cancel();
                    self.channel.received(control);
                    Ok(Wait::Accepted)
                }
                _ => Ok(Wait::Pending),
            },
            Poll::Idle => Ok(Wait::Pending),
            Poll::Expired => {
                self.channel.stats.timeouts += 1;
                tracing::warn!(
                    "No answer in {} (attempt {} of {})",
                    Self::state_name(),
                    self.attempts,
                    self.channel.config.max_retries
                );
                Ok(Wait::Expired)
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.attempts >= self.channel.config.max_retries
    }

    fn give_up(mut self, stage: &'static str) -> LinkError {
        let attempts = self.attempts;
        self.channel.fail(LinkError::HandshakeTimeout { stage, attempts })
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl LinkState for LinkFsm<SendSet> {
    fn step(self: Box<Self>) -> Result<Step, LinkError> {
        let mut fsm = *self;
        fsm.send_and_arm(SET, UA)?;
        Ok(Step::Next(fsm.transition::<AwaitUa>()))
    }
}

impl LinkState for LinkFsm<AwaitUa> {
    fn step(mut self: Box<Self>) -> Result<Step, LinkError> {
        match self.wait()? {
            Wait::Accepted => Ok(Step::Done(self.channel)),
            Wait::Pending => self.stay(),
            Wait::Expired if self.exhausted() => Err(self.give_up("SET")),
            Wait::Expired => Ok(Step::Next(self.transition::<SendSet>())),
        }
    }
}

impl LinkState for LinkFsm<AwaitSet> {
    fn step(mut self: Box<Self>) -> Result<Step, LinkError> {
        match self.wait()? {
            Wait::Accepted => Ok(Step::Next(self.transition::<SendUa>())),
            // no timer on this side, the initiator decides when to give up
            Wait::Pending | Wait::Expired => self.stay(),
        }
    }
}

impl LinkState for LinkFsm<SendUa> {
    fn step(self: Box<Self>) -> Result<Step, LinkError> {
        let mut fsm = *self;
        fsm.channel.send_supervisory(UA)?;
        Ok(Step::Done(fsm.channel))
    }
}

impl LinkState for LinkFsm<SendDisc> {
    fn step(self: Box<Self>) -> Result<Step, LinkError> {
        let mut fsm = *self;
        fsm.send_and_arm(DISC, DISC)?;
        Ok(Step::Next(fsm.transition::<AwaitDisc>()))
    }
}

impl LinkState for LinkFsm<AwaitDisc> {
    fn step(mut self: Box<Self>) -> Result<Step, LinkError> {
        match self.wait()? {
            Wait::Accepted => Ok(Step::Next(self.transition::<SendFinalUa>())),
            Wait::Pending => self.stay(),
            Wait::Expired if self.exhausted() => Err(self.give_up("DISC")),
            Wait::Expired => Ok(Step::Next(self.transition::<SendDisc>())),
        }
    }
}

impl LinkState for LinkFsm<SendFinalUa> {
    fn step(self: Box<Self>) -> Result<Step, LinkError> {
        let mut fsm = *self;
        fsm.channel.send_supervisory(UA)?;
        Ok(Step::Done(fsm.channel))
    }
}

impl LinkState for LinkFsm<AwaitPeerDisc> {
    fn step(mut self: Box<Self>) -> Result<Step, LinkError> {
        match self.wait()? {
            Wait::Accepted => Ok(Step::Next(self.transition::<ReplyDisc>())),
            Wait::Pending | Wait::Expired => self.stay(),
        }
    }
}

impl LinkState for LinkFsm<ReplyDisc> {
    fn step(self: Box<Self>) -> Result<Step, LinkError> {
        let mut fsm = *self;
        fsm.send_and_arm(DISC, UA)?;
        Ok(Step::Next(fsm.transition::<AwaitFinalUa>()))
    }
}

impl LinkState for LinkFsm<AwaitFinalUa> {
    fn step(mut self: Box<Self>) -> Result<Step, LinkError> {
        match self.wait()? {
            Wait::Accepted => Ok(Step::Done(self.channel)),
            Wait::Pending => self.stay(),
            Wait::Expired if self.exhausted() => Err(self.give_up("DISC")),
            Wait::Expired => Ok(Step::Next(self.transition::<ReplyDisc>())),
        }
    }
}

// ============================================================================
// Runners
// ============================================================================

fn run(mut state: Box<dyn LinkState>) -> Result<Channel, LinkError> {
    loop {
        match state.step()? {
            Step::Next(next) => state = next,
            Step::Done(channel) => return Ok(channel),
        }
    }
}

/// SET/UA exchange. Returns the channel once the connection is open.
pub fn establish(channel: Channel) -> Result<Channel, LinkError> {
    let start: Box<dyn LinkState> = match channel.role() {
        Role::Transmitter => LinkFsm::<SendSet>::start(channel, Recognizer::supervisory(UA)),
        Role::Receiver => LinkFsm::<AwaitSet>::start(channel, Recognizer::supervisory(SET)),
    };
    run(start)
}

/// DISC/DISC/UA exchange. `disc_received` skips the wait for the peer's
/// DISC when the receive path already consumed it.
pub fn teardown(channel: Channel, disc_received: bool) -> Result<Channel, LinkError> {
    let recognizer = Recognizer::supervisory(DISC);
    let start: Box<dyn LinkState> = match channel.role() {
        Role::Transmitter => LinkFsm::<SendDisc>::start(channel, recognizer),
        Role::Receiver if disc_received => LinkFsm::<ReplyDisc>::start(channel, recognizer),
        Role::Receiver => LinkFsm::<AwaitPeerDisc>::start(channel, recognizer),
    };
    run(start)
}

// ============================================================================
// Tests
// ============================================================================
