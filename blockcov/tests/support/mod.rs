//! A small interpreter for method bodies, so instrumented code can actually be executed.
//!
//! `invoke` pops one value and "calls" a method which throws when that value is negative. A caught exception is
//! pushed as `0` for the handler.

#![allow(dead_code)]

use blockcov::asm;
use blockcov::insn::{Insn, Label, Method};
use blockcov::Collector;

use std::collections::HashMap;

const STEP_LIMIT: usize = 100_000;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    Returned(Option<i64>),
    Threw,
}

pub struct Machine<'a> {
    collector: &'a Collector,
    program: Vec<Insn>,
    labels: HashMap<Label, usize>,
    handlers: Vec<(usize, usize, usize)>,
}

impl<'a> Machine<'a> {
    pub fn new(method: &Method, collector: &'a Collector) -> Machine<'a> {
        let program = method.insns.iter().map(|(_, insn)| insn.clone()).collect::<Vec<_>>();
        let labels = program
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match *insn {
                Insn::Label(label) => Some((label, i)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();
        let handlers = method
            .handlers
            .iter()
            .map(|tc| (labels[&tc.start], labels[&tc.end], labels[&tc.handler]))
            .collect();
        Machine {
            collector,
            program,
            labels,
            handlers,
        }
    }

    pub fn run(&self, args: &[i64]) -> Outcome {
        let mut locals = [0i64; 8];
        locals[..args.len()].copy_from_slice(args);
        let mut stack = Vec::new();
        let mut pc = 0;

        for _ in 0..STEP_LIMIT {
            let insn = match self.program.get(pc) {
                Some(insn) => insn,
                None => panic!("fell off the end of the method"),
            };
            pc += 1;
            let mut throw = false;
            match *insn {
                Insn::Label(_) | Insn::Line(_) => {},
                Insn::Op(ref op) => {
                    use blockcov::insn::Op;
                    match *op {
                        Op::Nop => {},
                        Op::Const(c) => stack.push(c),
                        Op::Load(n) => stack.push(locals[n as usize]),
                        Op::Store(n) => locals[n as usize] = stack.pop().unwrap(),
                        Op::Add => {
                            let b = stack.pop().unwrap();
                            let a = stack.pop().unwrap();
                            stack.push(a + b);
                        },
                        Op::Sub => {
                            let b = stack.pop().unwrap();
                            let a = stack.pop().unwrap();
                            stack.push(a - b);
                        },
                        Op::Dup => {
                            let a = *stack.last().unwrap();
                            stack.push(a);
                        },
                        Op::Pop => {
                            stack.pop().unwrap();
                        },
                        Op::Invoke(_) => throw = stack.pop().unwrap() < 0,
                    }
                },
                Insn::If { cond, target } => {
                    if cond.test(stack.pop().unwrap()) {
                        pc = self.labels[&target];
                    }
                },
                Insn::Goto(target) => pc = self.labels[&target],
                Insn::TableSwitch { min, default, ref labels } => {
                    let index = stack.pop().unwrap() - i64::from(min);
                    let target = if 0 <= index && (index as usize) < labels.len() {
                        labels[index as usize]
                    } else {
                        default
                    };
                    pc = self.labels[&target];
                },
                Insn::LookupSwitch { default, ref keys, ref labels } => {
                    let value = stack.pop().unwrap();
                    let target = match keys.iter().position(|&k| i64::from(k) == value) {
                        Some(i) => labels[i],
                        None => default,
                    };
                    pc = self.labels[&target];
                },
                Insn::Return => return Outcome::Returned(None),
                Insn::ReturnValue => return Outcome::Returned(stack.pop()),
                Insn::Throw => throw = true,
                Insn::Hit { slot, tag: None } => self.collector.hit(slot),
                Insn::Hit { slot, tag: Some(tag) } => self.collector.hit_tagged(slot, tag),
            }

            if throw {
                let at = pc - 1;
                match self.handlers.iter().find(|&&(start, end, _)| start <= at && at < end) {
                    Some(&(_, _, handler)) => {
                        stack.clear();
                        stack.push(0);
                        pc = handler;
                    },
                    None => return Outcome::Threw,
                }
            }
        }
        panic!("step limit exceeded");
    }
}

/// Parses a single method.
pub fn method(source: &str) -> Method {
    let mut methods = asm::parse(source).unwrap();
    assert_eq!(methods.len(), 1);
    methods.pop().unwrap()
}
