mod case;
mod hexagram;
mod setting;
mod trigram;

pub use case::{DivinationCase, DivinationMethod};
pub use hexagram::Hexagram;
pub use setting::Setting;
pub use trigram::Trigram;
