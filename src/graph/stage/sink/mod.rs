pub use self::fold::Fold;

mod fold;
