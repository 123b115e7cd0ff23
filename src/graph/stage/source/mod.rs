pub use self::sequence::Sequence;

mod sequence;
