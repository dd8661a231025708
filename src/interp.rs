//! The interpreter core: value stack, grouping stack, name bank and ruler
//! stack.
//!
//! The value stack holds tagged values; heap-backed kinds (texts, blobs,
//! graphs, sets, pointers) are represented by ids into their stores, so
//! pushing and popping never copies payload bytes and a value bound in the
//! bank aliases the same object as a copy still on the stack.
//!
//! Each open group hides everything beneath it: `pop` only sees elements
//! above the most recent group mark, and closing a group requires exactly
//! one visible element, which becomes the group's result.

use crate::art::Art;
use crate::blob::BlobId;
use crate::error::{src_line, LibError, LibResult};
use crate::graph::GraphId;
use crate::pointer::PointerId;
use crate::ruler::Ruler;
use crate::set::SetId;
use crate::text::TextId;
use std::collections::HashMap;

const STACK_MAX: usize = 16_384;
const GROUP_MAX: usize = 1_024;
const BANK_MAX: usize = 16_384;
const RSTACK_MAX: usize = 1_024;

/// A tagged interpreter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Integer(i32),
    Text(TextId),
    Blob(BlobId),
    Graph(GraphId),
    Set(SetId),
    Art(Art),
    Ruler(Ruler),
    Pointer(PointerId),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Text(_) => "text object",
            Value::Blob(_) => "blob object",
            Value::Graph(_) => "graph object",
            Value::Set(_) => "set object",
            Value::Art(_) => "articulation object",
            Value::Ruler(_) => "ruler object",
            Value::Pointer(_) => "pointer object",
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Binding {
    value: Value,
    is_const: bool,
}

/// Check a variable, constant or operation name against the name grammar:
/// a letter followed by up to 30 letters, digits or underscores.
pub fn valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 31 {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Interpreter state for one compilation.
#[derive(Debug, Default)]
pub struct Interp {
    stack: Vec<Value>,
    groups: Vec<usize>,
    bank: HashMap<String, Binding>,
    rstack: Vec<Ruler>,
}

impl Interp {
    pub fn new() -> Interp {
        Interp::default()
    }

    /// Number of stack elements hidden by the innermost open group.
    fn hidden(&self) -> usize {
        self.groups.last().copied().unwrap_or(0)
    }

    pub fn push(&mut self, v: Value, line: i64) -> LibResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(LibError::StackOverflow {
                line: src_line(line),
            });
        }
        self.stack.push(v);
        Ok(())
    }

    pub fn pop(&mut self, line: i64) -> LibResult<Value> {
        if self.stack.len() <= self.hidden() {
            return Err(LibError::StackUnderflow {
                line: src_line(line),
            });
        }
        Ok(self.stack.pop().unwrap())
    }

    pub fn begin_group(&mut self, line: i64) -> LibResult<()> {
        if self.groups.len() >= GROUP_MAX {
            return Err(LibError::GroupConstraint {
                what: String::from("Too much group nesting"),
                line: src_line(line),
            });
        }
        self.groups.push(self.stack.len());
        Ok(())
    }

    pub fn end_group(&mut self, line: i64) -> LibResult<()> {
        let mark = match self.groups.last() {
            Some(&m) => m,
            None => {
                return Err(LibError::GroupConstraint {
                    what: String::from("Unpaired end group"),
                    line: src_line(line),
                })
            }
        };
        if self.stack.len() != mark + 1 {
            return Err(LibError::GroupConstraint {
                what: String::from("Group must produce exactly one value"),
                line: src_line(line),
            });
        }
        self.groups.pop();
        Ok(())
    }

    /// Pop a value and bind it under a new name.
    pub fn declare(&mut self, name: &str, is_const: bool, line: i64) -> LibResult<()> {
        if !valid_name(name) {
            return Err(LibError::InvalidName {
                name: name.to_owned(),
                line: src_line(line),
            });
        }
        if self.bank.contains_key(name) {
            return Err(LibError::Redefinition {
                name: name.to_owned(),
                line: src_line(line),
            });
        }
        if self.bank.len() >= BANK_MAX {
            return Err(range_err!(line, "Too many variables and constants"));
        }
        let value = self.pop(line)?;
        self.bank.insert(name.to_owned(), Binding { value, is_const });
        Ok(())
    }

    /// Push the value bound under a name.
    pub fn get(&mut self, name: &str, line: i64) -> LibResult<()> {
        if !valid_name(name) {
            return Err(LibError::InvalidName {
                name: name.to_owned(),
                line: src_line(line),
            });
        }
        let value = match self.bank.get(name) {
            Some(b) => b.value,
            None => {
                return Err(LibError::Undefined {
                    name: name.to_owned(),
                    line: src_line(line),
                })
            }
        };
        self.push(value, line)
    }

    /// Pop a value and replace an existing variable binding with it.
    pub fn assign(&mut self, name: &str, line: i64) -> LibResult<()> {
        if !valid_name(name) {
            return Err(LibError::InvalidName {
                name: name.to_owned(),
                line: src_line(line),
            });
        }
        match self.bank.get(name) {
            None => {
                return Err(LibError::Undefined {
                    name: name.to_owned(),
                    line: src_line(line),
                })
            }
            Some(b) if b.is_const => {
                return Err(LibError::ConstAssign {
                    name: name.to_owned(),
                    line: src_line(line),
                })
            }
            Some(_) => {}
        }
        let value = self.pop(line)?;
        if let Some(b) = self.bank.get_mut(name) {
            b.value = value;
        }
        Ok(())
    }

    pub fn rstack_push(&mut self, r: Ruler, line: i64) -> LibResult<()> {
        if self.rstack.len() >= RSTACK_MAX {
            return Err(range_err!(line, "Ruler stack overflow"));
        }
        self.rstack.push(r);
        Ok(())
    }

    pub fn rstack_pop(&mut self, line: i64) -> LibResult<Ruler> {
        self.rstack.pop().ok_or(range_err!(line, "Ruler stack underflow"))
    }

    /// The top of the ruler stack, or the default ruler when it is empty.
    pub fn rstack_current(&self) -> Ruler {
        self.rstack.last().copied().unwrap_or_else(Ruler::default_ruler)
    }

    /// End-of-script check: the stack must be empty and every group closed.
    pub fn finish(&self) -> LibResult<()> {
        if !self.stack.is_empty() {
            return Err(LibError::GroupConstraint {
                what: String::from("Interpreter stack must be empty at end of script"),
                line: -1,
            });
        }
        if !self.groups.is_empty() {
            return Err(LibError::GroupConstraint {
                what: String::from("Open group left at end of script"),
                line: -1,
            });
        }
        Ok(())
    }

    // typed pop helpers for the operation adapters

    pub fn pop_int(&mut self, line: i64) -> LibResult<i32> {
        match self.pop(line)? {
            Value::Integer(i) => Ok(i),
            _ => Err(LibError::TypeMismatch {
                expected: "integer",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_text(&mut self, line: i64) -> LibResult<TextId> {
        match self.pop(line)? {
            Value::Text(id) => Ok(id),
            _ => Err(LibError::TypeMismatch {
                expected: "text object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_blob(&mut self, line: i64) -> LibResult<BlobId> {
        match self.pop(line)? {
            Value::Blob(id) => Ok(id),
            _ => Err(LibError::TypeMismatch {
                expected: "blob object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_graph(&mut self, line: i64) -> LibResult<GraphId> {
        match self.pop(line)? {
            Value::Graph(id) => Ok(id),
            _ => Err(LibError::TypeMismatch {
                expected: "graph object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_set(&mut self, line: i64) -> LibResult<SetId> {
        match self.pop(line)? {
            Value::Set(id) => Ok(id),
            _ => Err(LibError::TypeMismatch {
                expected: "set object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_art(&mut self, line: i64) -> LibResult<Art> {
        match self.pop(line)? {
            Value::Art(a) => Ok(a),
            _ => Err(LibError::TypeMismatch {
                expected: "articulation object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_ruler(&mut self, line: i64) -> LibResult<Ruler> {
        match self.pop(line)? {
            Value::Ruler(r) => Ok(r),
            _ => Err(LibError::TypeMismatch {
                expected: "ruler object",
                line: src_line(line),
            }),
        }
    }

    pub fn pop_pointer(&mut self, line: i64) -> LibResult<PointerId> {
        match self.pop(line)? {
            Value::Pointer(id) => Ok(id),
            _ => Err(LibError::TypeMismatch {
                expected: "pointer object",
                line: src_line(line),
            }),
        }
    }
}
