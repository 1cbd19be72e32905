// TPD - Test Plan Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Test-plan data model shared by the engine and its observers.

mod macros {
    /// Declares a `u64` newtype identifier backed by a process-wide counter.
    macro_rules! universal_id {
        (
            $(#[$attr:meta])*
            $name:ident => $initial_value:expr
        ) => {
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            pub struct $name(u64);

            paste::paste! {
                #[doc = "The global counter for the " $name " object."]
                static [<NEXT_ $name:upper>]: std::sync::atomic::AtomicU64 =
                    std::sync::atomic::AtomicU64::new($initial_value);

                impl $name {
                    /// Get the next value and increment the global counter.
                    pub fn next() -> Self {
                        Self([<NEXT_ $name:upper>].fetch_add(1, std::sync::atomic::Ordering::Relaxed))
                    }
                }
            }

            impl From<$name> for u64 {
                fn from(value: $name) -> Self {
                    value.0
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "#{}", self.0)
                }
            }
        };
    }

    pub(crate) use universal_id;
}

/// Run context bound to the thread executing a plan
pub mod context;
/// Plan tree, node kinds and identities
pub mod plan;
/// Sample results produced by samplers
pub mod sample;

pub use context::*;
pub use plan::*;
pub use sample::*;
