//! Payloads carried by the pipeline queues

/// One period of mono samples
pub type Samples = Box<[f32]>;

/// A queue item: data, or the termination marker that ends the stage
#[derive(Debug)]
pub enum Envelope<T> {
    Data(T),
    Terminate,
}

/// Input to write onto the recording tape
#[derive(Debug)]
pub struct WriteRequest {
    pub pos: u64,
    pub samples: Samples,
}

/// Coordinator -> worker, one per tape per period
#[derive(Debug)]
pub struct Instruction {
    /// Signed playback rate; negative scrubs backward
    pub speed: f64,
    /// `None` renders silence (stopped or paused)
    pub read_pos: Option<u64>,
    /// Only the recording tape ever receives a write
    pub write: Option<WriteRequest>,
}

/// Worker -> audio callback
#[derive(Debug)]
pub struct RenderedBlock {
    /// Read position the block was rendered from
    pub origin: Option<u64>,
    pub samples: Samples,
}

impl RenderedBlock {
    pub fn silence(origin: Option<u64>, blocksize: usize) -> Self {
        Self {
            origin,
            samples: vec![0.0; blocksize].into_boxed_slice(),
        }
    }
}

/// Audio callback -> coordinator
#[derive(Debug)]
pub struct CapturedBlock {
    /// Where the input belongs on tape; `None` when it was captured while
    /// the transport was silent
    pub write_pos: Option<u64>,
    pub samples: Samples,
}

impl CapturedBlock {
    pub fn silence(blocksize: usize) -> Self {
        Self {
            write_pos: None,
            samples: vec![0.0; blocksize].into_boxed_slice(),
        }
    }

    /// The write this block asks for, if it has a position
    pub fn into_write(self) -> Option<WriteRequest> {
        let samples = self.samples;
        self.write_pos.map(|pos| WriteRequest { pos, samples })
    }
}
