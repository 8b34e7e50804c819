//! A line-based text form of method bodies, used by the demos and the tests.
//!
//! ```text
//! # comment
//! method choose
//!         line 3
//!         load 0
//!         ifeq L0
//!         const 1
//!         goto L1
//! L0:     const 2
//! L1:     vreturn
//!         catch L0 L1 L2
//! ```
//!
//! Switches are written `tableswitch MIN DEFAULT LABEL...` and `lookupswitch DEFAULT KEY:LABEL...`. `catch START END
//! HANDLER` adds a row to the handler table of the current method.

use error::*;
use insn::{Cond, Insn, Label, Method, Op, Slot, TryCatch};

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Parses every method of a source text.
///
/// # Errors
///
/// Returns [`Syntax`] on the first malformed line.
///
/// [`Syntax`]: ../error/enum.ErrorKind.html#variant.Syntax
pub fn parse(source: &str) -> Result<Vec<Method>> {
    let mut methods = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        parse_line(line, &mut methods).map_err(|message| ErrorKind::Syntax(index + 1, message))?;
    }
    Ok(methods)
}

/// Reads and parses a source file.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Vec<Method>> {
    let path = path.as_ref();
    let mut source = String::new();
    File::open(path)?.read_to_string(&mut source)?;
    parse(&source).chain_err(|| format!("cannot parse {}", path.display()))
}

fn parse_line(line: &str, methods: &mut Vec<Method>) -> ::std::result::Result<(), String> {
    let mut words = line.split_whitespace().peekable();
    if words.peek() == Some(&"method") {
        words.next();
        let name = words.next().ok_or("missing method name")?;
        methods.push(Method::new(name, Vec::new()));
        return Ok(());
    }

    let method = match words.peek() {
        None => return Ok(()),
        Some(_) => methods.last_mut().ok_or("instruction outside of a method")?,
    };

    while let Some(&word) = words.peek() {
        if !word.ends_with(':') {
            break;
        }
        words.next();
        let label = label(&word[..word.len() - 1])?;
        if method.insns.is_placed(label) {
            return Err(format!("label {:?} is already placed", label));
        }
        method.insns.push(Insn::Label(label));
    }

    let mnemonic = match words.next() {
        Some(m) => m,
        None => return Ok(()),
    };
    let args = words.collect::<Vec<_>>();
    let arity = |n: usize| -> ::std::result::Result<(), String> {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("`{}` takes {} operands", mnemonic, n))
        }
    };

    let insn = match mnemonic {
        "catch" => {
            arity(3)?;
            method.handlers.push(TryCatch {
                start: label(args[0])?,
                end: label(args[1])?,
                handler: label(args[2])?,
            });
            return Ok(());
        },
        "line" => {
            arity(1)?;
            Insn::Line(number(args[0])?)
        },
        "nop" | "add" | "sub" | "dup" | "pop" | "return" | "vreturn" | "throw" => {
            arity(0)?;
            match mnemonic {
                "nop" => Insn::Op(Op::Nop),
                "add" => Insn::Op(Op::Add),
                "sub" => Insn::Op(Op::Sub),
                "dup" => Insn::Op(Op::Dup),
                "pop" => Insn::Op(Op::Pop),
                "return" => Insn::Return,
                "vreturn" => Insn::ReturnValue,
                _ => Insn::Throw,
            }
        },
        "const" => {
            arity(1)?;
            Insn::Op(Op::Const(number(args[0])?))
        },
        "load" => {
            arity(1)?;
            Insn::Op(Op::Load(number(args[0])?))
        },
        "store" => {
            arity(1)?;
            Insn::Op(Op::Store(number(args[0])?))
        },
        "invoke" => {
            arity(1)?;
            Insn::Op(Op::Invoke(number(args[0])?))
        },
        "hit" => {
            arity(1)?;
            Insn::Hit {
                slot: Slot(number(args[0])?),
                tag: None,
            }
        },
        "goto" => {
            arity(1)?;
            Insn::Goto(label(args[0])?)
        },
        "tableswitch" => {
            if args.len() < 2 {
                return Err("`tableswitch` takes a minimum and a default".to_owned());
            }
            Insn::TableSwitch {
                min: number(args[0])?,
                default: label(args[1])?,
                labels: args[2..].iter().map(|a| label(a)).collect::<::std::result::Result<_, _>>()?,
            }
        },
        "lookupswitch" => {
            if args.is_empty() {
                return Err("`lookupswitch` takes a default".to_owned());
            }
            let mut keys = Vec::with_capacity(args.len() - 1);
            let mut labels = Vec::with_capacity(args.len() - 1);
            for case in &args[1..] {
                let colon = case.find(':').ok_or_else(|| format!("expected KEY:LABEL, found `{}`", case))?;
                keys.push(number(&case[..colon])?);
                labels.push(label(&case[colon + 1..])?);
            }
            Insn::LookupSwitch {
                default: label(args[0])?,
                keys,
                labels,
            }
        },
        m if m.starts_with("if") => {
            arity(1)?;
            let cond = match &m[2..] {
                "eq" => Cond::Eq,
                "ne" => Cond::Ne,
                "lt" => Cond::Lt,
                "ge" => Cond::Ge,
                "gt" => Cond::Gt,
                "le" => Cond::Le,
                _ => return Err(format!("unknown instruction `{}`", m)),
            };
            Insn::If {
                cond,
                target: label(args[0])?,
            }
        },
        m => return Err(format!("unknown instruction `{}`", m)),
    };
    method.insns.push(insn);
    Ok(())
}

fn label(s: &str) -> ::std::result::Result<Label, String> {
    if s.starts_with('L') {
        if let Ok(n) = s[1..].parse() {
            return Ok(Label(n));
        }
    }
    Err(format!("expected a label, found `{}`", s))
}

fn number<T: FromStr>(s: &str) -> ::std::result::Result<T, String> {
    s.parse().map_err(|_| format!("expected a number, found `{}`", s))
}
