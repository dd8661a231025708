//! The script entity stream and its driver.
//!
//! A score script is a flat sequence of *entities*: literals, name
//! operations, grouping marks and operation invocations. The lexer turns
//! script text into `(Entity, line)` pairs and the driver feeds them to the
//! interpreter, so the engine core never sees raw text.
//!
//! Script syntax:
//!
//! * `%infrared;` — required header before any entity.
//! * `# …` — comment to end of line.
//! * `"…"` — text literal, printable ASCII with `\\` and `\"` escapes.
//! * `{…}` — blob literal, base-16 pairs with optional whitespace.
//! * `123`, `-4`, `+7` — integer literal. A trailing lowercase letter
//!   makes it a pointer adjustment instead: `3s` jumps the pointer on the
//!   stack to section 3, and `q r g t m` set offset, relative offset,
//!   grace index, tilt and moment part the same way.
//! * `?name` / `@name` — declare a variable / constant from the stack top.
//! * `:name` / `=name` — assign to / read from a binding.
//! * `(` `)` — group markers; a group must yield exactly one value.
//! * `[a, b, c]` — array: each element is implicitly grouped, and the
//!   element count is pushed after the elements.
//! * anything else — an operation name.

use crate::error::{src_line, LibError, LibResult};
use crate::interp::Value;
use crate::pointer::Pointer;
use crate::prim;
use crate::session::Session;
use log::trace;

/// The two string literal shapes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringKind {
    Curly,
    Quoted,
}

/// One script entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Entity {
    String {
        kind: StringKind,
        prefix: String,
        value: String,
    },
    Numeric {
        lexeme: String,
    },
    Variable {
        name: String,
    },
    Constant {
        name: String,
    },
    Assign {
        name: String,
    },
    Get {
        name: String,
    },
    BeginGroup,
    EndGroup,
    Array {
        count: i32,
    },
    Operation {
        name: String,
    },
}

fn syntax(what: &str, line: i64) -> LibError {
    LibError::Syntax {
        what: what.to_owned(),
        line: src_line(line),
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: i64,
}

struct ArrayFrame {
    count: i32,
    element_open: bool,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Lexer<'a> {
        Lexer {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_blank(&mut self) {
        loop {
            match self.chars.peek() {
                Some(&c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn is_delimiter(c: char) -> bool {
        c.is_ascii_whitespace()
            || matches!(c, '(' | ')' | '[' | ']' | ',' | '"' | '{' | '}' | '#' | ';')
    }

    fn read_token(&mut self) -> String {
        let mut tok = String::new();
        while let Some(&c) = self.chars.peek() {
            if Self::is_delimiter(c) {
                break;
            }
            tok.push(c);
            self.bump();
        }
        tok
    }

    /// Consume the `%infrared;` header.
    fn read_header(&mut self) -> LibResult<()> {
        self.skip_blank();
        if self.bump() != Some('%') {
            return Err(syntax("Missing %infrared; script header", self.line));
        }
        let name = self.read_token();
        if name != "infrared" || self.bump() != Some(';') {
            return Err(syntax("Missing %infrared; script header", self.line));
        }
        Ok(())
    }

    fn read_quoted(&mut self) -> LibResult<String> {
        let start = self.line;
        let mut value = String::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return Err(syntax("Unterminated string literal", start)),
            };
            match c {
                '"' => return Ok(value),
                '\n' => return Err(syntax("Line break inside string literal", start)),
                '\\' => {
                    value.push('\\');
                    match self.bump() {
                        Some(e) => value.push(e),
                        None => return Err(syntax("Unterminated string literal", start)),
                    }
                }
                _ => value.push(c),
            }
        }
    }

    fn read_curly(&mut self) -> LibResult<String> {
        let start = self.line;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('}') => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(syntax("Unterminated blob literal", start)),
            }
        }
    }

    fn lex(&mut self) -> LibResult<Vec<(Entity, i64)>> {
        self.read_header()?;

        let mut out: Vec<(Entity, i64)> = Vec::new();
        let mut arrays: Vec<ArrayFrame> = Vec::new();

        loop {
            self.skip_blank();
            let line = self.line;
            let c = match self.chars.peek() {
                Some(&c) => c,
                None => break,
            };

            // every entity except array punctuation marks the current
            // array element as non-empty
            let mut content = true;
            match c {
                '(' => {
                    self.bump();
                    out.push((Entity::BeginGroup, line));
                }
                ')' => {
                    self.bump();
                    out.push((Entity::EndGroup, line));
                }
                '[' => {
                    self.bump();
                    arrays.push(ArrayFrame {
                        count: 0,
                        element_open: false,
                    });
                    out.push((Entity::BeginGroup, line));
                }
                ',' => {
                    content = false;
                    self.bump();
                    let frame = arrays.last_mut().ok_or_else(|| syntax("Comma outside array", line))?;
                    if !frame.element_open {
                        return Err(syntax("Empty array element", line));
                    }
                    frame.count += 1;
                    frame.element_open = false;
                    out.push((Entity::EndGroup, line));
                    out.push((Entity::BeginGroup, line));
                }
                ']' => {
                    content = false;
                    self.bump();
                    let frame = arrays.pop().ok_or_else(|| syntax("Unpaired array close", line))?;
                    let count = if frame.element_open {
                        out.push((Entity::EndGroup, line));
                        frame.count + 1
                    } else if frame.count == 0 {
                        // an empty array: retract the opening group mark
                        match out.pop() {
                            Some((Entity::BeginGroup, _)) => 0,
                            _ => return Err(syntax("Empty array element", line)),
                        }
                    } else {
                        return Err(syntax("Empty array element", line));
                    };
                    out.push((Entity::Array { count }, line));
                }
                '"' => {
                    self.bump();
                    let value = self.read_quoted()?;
                    out.push((
                        Entity::String {
                            kind: StringKind::Quoted,
                            prefix: String::new(),
                            value,
                        },
                        line,
                    ));
                }
                '{' => {
                    self.bump();
                    let value = self.read_curly()?;
                    out.push((
                        Entity::String {
                            kind: StringKind::Curly,
                            prefix: String::new(),
                            value,
                        },
                        line,
                    ));
                }
                '?' | '@' | ':' | '=' => {
                    self.bump();
                    let name = self.read_token();
                    if name.is_empty() {
                        return Err(syntax("Missing name after sigil", line));
                    }
                    out.push((
                        match c {
                            '?' => Entity::Variable { name },
                            '@' => Entity::Constant { name },
                            ':' => Entity::Assign { name },
                            _ => Entity::Get { name },
                        },
                        line,
                    ));
                }
                '}' | ';' => {
                    return Err(syntax("Unexpected character", line));
                }
                _ => {
                    let tok = self.read_token();
                    if tok.is_empty() {
                        return Err(syntax("Unexpected character", line));
                    }
                    let first = tok.chars().next().unwrap();
                    if first.is_ascii_digit() || first == '+' || first == '-' {
                        out.push((Entity::Numeric { lexeme: tok }, line));
                    } else {
                        out.push((Entity::Operation { name: tok }, line));
                    }
                }
            }
            if content {
                if let Some(frame) = arrays.last_mut() {
                    frame.element_open = true;
                }
            }
        }

        if !arrays.is_empty() {
            return Err(syntax("Unterminated array", self.line));
        }
        Ok(out)
    }
}

/// Lex script text into an entity stream.
pub fn lex(text: &str) -> LibResult<Vec<(Entity, i64)>> {
    Lexer::new(text).lex()
}

/// Replace the `\\` and `\"` escapes of a quoted literal and reject
/// everything else that is not printable ASCII.
fn unescape_quoted(raw: &str, line: i64) -> LibResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if !(' '..='~').contains(&c) {
            return Err(syntax("String literal has bad characters", line));
        }
        if c == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                _ => return Err(syntax("String literal has invalid escapes", line)),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Interpret a numeric entity: either push an integer literal or, when a
/// pointer-adjustment suffix letter is present, pop a pointer, adjust it
/// and push it back.
fn run_numeric(session: &mut Session, lexeme: &str, line: i64) -> LibResult<()> {
    let mut body = lexeme;
    let mut suffix = None;
    if let Some(last) = lexeme.chars().last() {
        if last.is_ascii_lowercase() {
            suffix = Some(last);
            body = &lexeme[..lexeme.len() - 1];
        }
    }

    let mut digits = body;
    let mut negative = false;
    if let Some(rest) = body.strip_prefix('+') {
        digits = rest;
    } else if let Some(rest) = body.strip_prefix('-') {
        negative = true;
        digits = rest;
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(syntax("Invalid numeric literal", line));
    }

    let mut value: i32 = 0;
    for b in digits.bytes() {
        value = prim::mul(value, 10, line)?;
        value = prim::add(value, i32::from(b - b'0'), line)?;
    }
    if negative {
        value = prim::neg(value, line)?;
    }

    let suf = match suffix {
        None => {
            return session.interp.push(Value::Integer(value), line);
        }
        Some(s) => s,
    };

    let pid = session.interp.pop_pointer(line)?;
    if suf != 's' && session.pointers.get(pid).is_header() {
        return Err(range_err!(line, "Can't adjust header pointer"));
    }
    apply_pointer_suffix(session, pid, suf, value, line)?;
    session.interp.push(Value::Pointer(pid), line)
}

/// Shared by numeric suffixes and the `s q r g t m` operations.
pub(crate) fn apply_pointer_suffix(
    session: &mut Session,
    pid: crate::pointer::PointerId,
    suf: char,
    value: i32,
    line: i64,
) -> LibResult<()> {
    let ruler = session.interp.rstack_current();
    let p: &mut Pointer = session.pointers.get_mut(pid);
    match suf {
        's' => p.jump(value, line),
        'q' => p.seek(value, line),
        'r' => p.advance(value, line),
        'g' => p.grace(value, if value < 0 { Some(ruler) } else { None }, line),
        't' => p.tilt(value, line),
        'm' => p.moment(value, line),
        _ => Err(syntax("Unsupported numeric suffix", line)),
    }
}

/// Execute one entity against a session.
pub fn run_entity(session: &mut Session, entity: &Entity, line: i64) -> LibResult<()> {
    trace!("entity at line {}: {:?}", line, entity);
    match entity {
        Entity::String { kind, prefix, value } => {
            if !prefix.is_empty() {
                return Err(syntax("String prefixes not supported", line));
            }
            match kind {
                StringKind::Curly => {
                    let id = session.blobs.from_hex(value, line)?;
                    session.interp.push(Value::Blob(id), line)
                }
                StringKind::Quoted => {
                    let s = unescape_quoted(value, line)?;
                    let id = session.texts.literal(&s, line)?;
                    session.interp.push(Value::Text(id), line)
                }
            }
        }
        Entity::Numeric { lexeme } => run_numeric(session, lexeme, line),
        Entity::Variable { name } => session.interp.declare(name, false, line),
        Entity::Constant { name } => session.interp.declare(name, true, line),
        Entity::Assign { name } => session.interp.assign(name, line),
        Entity::Get { name } => session.interp.get(name, line),
        Entity::BeginGroup => session.interp.begin_group(line),
        Entity::EndGroup => session.interp.end_group(line),
        Entity::Array { count } => session.interp.push(Value::Integer(*count), line),
        Entity::Operation { name } => session.dispatch(name, line),
    }
}

/// Lex and execute a whole script, then check the interpreter is clean.
pub fn run_script(session: &mut Session, text: &str) -> LibResult<()> {
    for (entity, line) in lex(text)? {
        run_entity(session, &entity, line)?;
    }
    session.interp.finish()
}
