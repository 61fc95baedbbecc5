mod plurals;

pub use plurals::pluralize;
