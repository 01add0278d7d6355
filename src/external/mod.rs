pub mod command;
pub mod comparator;
pub mod generator;

pub use command::{CommandLine, CommandOutput};
pub use comparator::{ImageComparator, PixelComparator, ProcessComparator};
pub use generator::{GenerateParams, Generation, Generator, ProcessGenerator};
