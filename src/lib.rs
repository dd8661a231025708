/*!
Infrared compiles a declarative, stack-oriented score script together with
quantised note input (NMF) into a Format-0 Standard MIDI File.

The script describes how notes should be *performed*: articulation
envelopes, grace-note placement, velocity graphs, per-note channel routing,
automatic controller streams and metadata events. It does so by registering
classifiers that match notes by section, layer and articulation; the
renderer applies them to every note and the assembler serialises the
result.

```no_run
use infrared::nmf::NmfData;

let nmf = NmfData::read(std::io::stdin().lock()).unwrap();
let mut out = Vec::new();
infrared::compile_to("%infrared;", nmf, &mut out).unwrap();
```

The engine's native time unit is the *subquantum* (an eighth of an NMF
quantum); every event time is a packed [`moment`](crate::moment) integer
that also carries a start/middle/end tiebreaker. See the module
documentation for the individual subsystems.
*/

#[macro_use]
mod error;

mod art;
mod blob;
mod control;
mod graph;
mod interp;
mod midi;
mod moment;
mod ops;
mod pointer;
mod prim;
mod render;
mod ruler;
mod scribe;
mod script;
mod session;
mod set;
mod text;
mod vlq;

pub mod nmf;

pub use error::{Error, Result};
pub use session::{compile_to, Session};
