//! Per-endpoint state and request queues.

use gadget::request::Request;
use gadget::setup::EndpointDescriptor;

/// EP0 plus four bulk/interrupt endpoints, matching the hardware.
pub(crate) const NUM_ENDPOINTS: usize = 5;

/// The control endpoint's FIFO holds one 8-byte packet.
pub(crate) const EP0_MAX_PACKET: u16 = 8;

/// Each data endpoint's FIFO holds one 64-byte packet.
pub(crate) const FIFO_SIZE: u16 = 64;

const QUEUE_DEPTH: usize = 4;

pub(crate) struct EndpointState {
    /// Recorded at `enable`; `None` while the endpoint is down. EP0 carries
    /// its implicit control descriptor from construction onward.
    pub descriptor: Option<EndpointDescriptor>,
    pub halted: bool,
    pub queue: RequestQueue,
}

impl EndpointState {
    pub const fn new(descriptor: Option<EndpointDescriptor>) -> EndpointState {
        EndpointState {
            descriptor,
            halted: false,
            queue: RequestQueue::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn is_in(&self) -> bool {
        self.descriptor
            .map_or(false, |d| d.endpoint_address.is_in())
    }

    pub fn max_packet(&self) -> usize {
        self.descriptor.map_or(0, |d| d.max_packet_size as usize)
    }
}

/// A fixed-capacity FIFO of pending transfer requests.
///
/// The head request is the one in flight against the hardware; everything
/// behind it waits its turn.
pub(crate) struct RequestQueue {
    slots: [Option<Request>; QUEUE_DEPTH],
    head: usize,
    len: usize,
}

impl RequestQueue {
    pub const fn new() -> RequestQueue {
        RequestQueue {
            slots: [None, None, None, None],
            head: 0,
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Append a request; hands it back if the queue is full.
    pub fn push_back(&mut self, request: Request) -> Result<(), Request> {
        if self.len == QUEUE_DEPTH {
            return Err(request);
        }
        let slot = (self.head + self.len) % QUEUE_DEPTH;
        self.slots[slot] = Some(request);
        self.len += 1;
        Ok(())
    }

    pub fn pop_front(&mut self) -> Option<Request> {
        if self.len == 0 {
            return None;
        }
        let request = self.slots[self.head].take();
        self.head = (self.head + 1) % QUEUE_DEPTH;
        self.len -= 1;
        request
    }

    pub fn front_mut(&mut self) -> Option<&mut Request> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_mut()
    }

    /// Remove the first queued request carrying `handle`, preserving the
    /// order of the rest.
    pub fn remove(&mut self, handle: u32) -> Option<Request> {
        let position = (0..self.len).find(|i| {
            self.slots[(self.head + i) % QUEUE_DEPTH]
                .as_ref()
                .map_or(false, |r| r.handle == handle)
        })?;
        let removed = self.slots[(self.head + position) % QUEUE_DEPTH].take();
        for i in position..self.len - 1 {
            let from = (self.head + i + 1) % QUEUE_DEPTH;
            let to = (self.head + i) % QUEUE_DEPTH;
            self.slots[to] = self.slots[from].take();
        }
        self.len -= 1;
        removed
    }
}
