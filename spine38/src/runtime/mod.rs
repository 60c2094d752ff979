mod animation;
mod animation_state;
mod path;
mod skeleton;

pub use animation::{MixBlend, MixDirection};
pub use animation_state::*;
pub use skeleton::*;

#[cfg(test)]
mod skeleton_tests;


#[cfg(test)]
mod animation_tests;

#[cfg(test)]
mod animation_state_tests;
