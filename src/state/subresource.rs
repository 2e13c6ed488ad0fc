//! Uniform/divergent per-subresource state storage.

use super::Subresource;

/// Per-subresource values of one resource.
///
/// Starts *uniform*: a single value stands for every subresource. Setting a
/// single subresource to a different value broadcasts the uniform value into a
/// per-subresource vector first (*divergent* tracking). A divergent record
/// only collapses back when [`Subresource::All`] is set explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubresourceStates<T> {
    count: u32,
    mode: Mode<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode<T> {
    Uniform(T),
    Divergent(Vec<T>),
}

impl<T: Copy + PartialEq> SubresourceStates<T> {
    /// Create a uniform record covering `count` subresources.
    pub fn new(count: u32, value: T) -> Self {
        Self {
            count: count.max(1),
            mode: Mode::Uniform(value),
        }
    }

    /// Number of subresources covered.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether a single value describes every subresource.
    pub fn is_uniform(&self) -> bool {
        matches!(self.mode, Mode::Uniform(_))
    }

    /// The shared value, if tracking is uniform.
    pub fn uniform(&self) -> Option<T> {
        match &self.mode {
            Mode::Uniform(value) => Some(*value),
            Mode::Divergent(_) => None,
        }
    }

    /// Value of one subresource.
    pub fn get(&self, subresource: u32) -> T {
        assert!(
            subresource < self.count,
            "subresource {} out of range ({} subresources)",
            subresource,
            self.count
        );
        match &self.mode {
            Mode::Uniform(value) => *value,
            Mode::Divergent(values) => values[subresource as usize],
        }
    }

    /// Set the value of one subresource or of all of them.
    pub fn set(&mut self, subresource: Subresource, value: T) {
        match subresource {
            Subresource::All => self.mode = Mode::Uniform(value),
            Subresource::Index(index) => {
                assert!(
                    index < self.count,
                    "subresource {} out of range ({} subresources)",
                    index,
                    self.count
                );
                match self.mode {
                    Mode::Uniform(current) if current == value => {}
                    Mode::Uniform(_) if self.count == 1 => self.mode = Mode::Uniform(value),
                    Mode::Uniform(current) => {
                        let mut values = vec![current; self.count as usize];
                        values[index as usize] = value;
                        self.mode = Mode::Divergent(values);
                    }
                    Mode::Divergent(ref mut values) => values[index as usize] = value,
                }
            }
        }
    }

    /// Iterate `(index, value)` over every subresource.
    pub fn iter(&self) -> impl Iterator<Item = (u32, T)> + '_ {
        (0..self.count).map(move |index| (index, self.get(index)))
    }
}
