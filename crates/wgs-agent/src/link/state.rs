//! Bounded-retry link state machine
//!
//! Pure transition logic: events in, actions out. The supervisor loop owns
//! the driver and the signal board and carries the actions out.

use std::net::IpAddr;

use wgs_core::{LinkEvent, LinkState};

/// What the supervisor must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Issue the first connect request
    Connect,
    /// Reissue a connect request after a failure
    Retry { attempt: u32 },
    /// First address of the session: raise `LINK_UP`
    RaiseLinkUp { address: IpAddr },
    /// Address acquired again after a reconnect; `LINK_UP` is already raised
    Restored { address: IpAddr },
    /// Retries exhausted before any link-up: raise `LINK_FAILED`
    RaiseLinkFailed,
    /// Retries exhausted after link-up was raised; nothing to signal
    GiveUp,
    /// Event has no effect in the current state
    Ignore,
}

/// Link state plus the retry counter
#[derive(Debug)]
pub struct LinkStateMachine {
    state: LinkState,
    retries: u32,
    max_retries: u32,
    link_up_raised: bool,
}

impl LinkStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: LinkState::Idle,
            retries: 0,
            max_retries,
            link_up_raised: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Failures since the last acquired address
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Leave `Idle` and request the first association
    pub fn start(&mut self) -> LinkAction {
        if self.state != LinkState::Idle {
            return LinkAction::Ignore;
        }
        self.state = LinkState::Connecting;
        LinkAction::Connect
    }

    /// Apply a driver event
    pub fn handle(&mut self, event: LinkEvent) -> LinkAction {
        match event {
            LinkEvent::SessionStarted => self.start(),
            LinkEvent::Disconnected { .. } => self.on_disconnected(),
            LinkEvent::AddressAcquired { address } => self.on_address(address),
        }
    }

    fn on_disconnected(&mut self) -> LinkAction {
        match self.state {
            LinkState::Connecting | LinkState::Connected => {
                if self.retries < self.max_retries {
                    self.retries += 1;
                    self.state = LinkState::Connecting;
                    LinkAction::Retry {
                        attempt: self.retries,
                    }
                } else {
                    self.state = LinkState::Failed;
                    if self.link_up_raised {
                        LinkAction::GiveUp
                    } else {
                        LinkAction::RaiseLinkFailed
                    }
                }
            }
            LinkState::Idle | LinkState::Failed => LinkAction::Ignore,
        }
    }

    fn on_address(&mut self, address: IpAddr) -> LinkAction {
        if self.state == LinkState::Failed {
            // LINK_FAILED is already out; raising LINK_UP now would set both
            return LinkAction::Ignore;
        }
        self.retries = 0;
        self.state = LinkState::Connected;
        if self.link_up_raised {
            LinkAction::Restored { address }
        } else {
            self.link_up_raised = true;
            LinkAction::RaiseLinkUp { address }
        }
    }
}
