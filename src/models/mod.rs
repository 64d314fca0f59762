mod template;

pub use template::{generate_shortid, Engine, Recipe, Template};
