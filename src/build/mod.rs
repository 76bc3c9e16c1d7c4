//! Index construction pipeline: parse → accumulate → dump sorted runs →
//! merge into the vocabulary and vector files (spec.md §4.4-§4.7).

pub mod accumulator;
pub mod merger;
pub mod parser;
pub mod rundumper;

pub use accumulator::Accumulator;
pub use parser::DocumentParser;
