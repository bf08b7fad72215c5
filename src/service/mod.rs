pub mod fanout;
pub mod synthesis;

pub use fanout::{FanOutOrchestrator, PanelBoard, PanelUpdate};
pub use synthesis::{build_synthesis_prompt, PanelResult, SynthesisRequester};
