//! Base control instructions
//!
//! Stack shuffling and flow control that the chain model itself relies on.
//! Merge [`table`] into the On/By/Next tables of a [`crate::Pbs`].

use crate::evo::Evo;
use crate::pbs::{Extent, Instruction, InstructionTable, Ret};
use crate::stack::Stack;
use crate::types::{ObtError, Result, Value};

/// The control instruction set
pub fn table() -> InstructionTable {
    InstructionTable::new()
        .with("push", Instruction::access(push).with_extent(Extent::All))
        .with("pop", Instruction::access(pop))
        .with("shift", Instruction::access(shift))
        .with("index", Instruction::access(index))
        .with("nil", Instruction::access(nil).with_extent(Extent::Optional(1)))
        .with("dup", Instruction::access(dup))
        .with("dups", Instruction::access(dups))
        .with("pack", Instruction::access(pack))
        .with("part", Instruction::access(part))
        .with("vain", Instruction::access(vain))
        .with("spread", Instruction::access(spread).with_extent(Extent::Take(1)))
        .with("pass", Instruction::plain(pass).with_extent(Extent::Take(1)))
        .with("end", Instruction::plain(end).with_extent(Extent::Take(1)))
        .with("avoid", Instruction::plain(avoid).with_extent(Extent::Optional(1)))
        .with("stop", Instruction::plain(stop).with_extent(Extent::Optional(1)))
        .with("prune", Instruction::prune())
        .with("debug", Instruction::access(debug))
}

/// Integer argument at `i`, or `default` when missing
fn int_arg(args: &[Value], i: usize, default: i64) -> i64 {
    args.get(i).and_then(Value::as_i64).unwrap_or(default)
}

fn push(evo: &mut Evo, stack: &mut Stack, mut args: Vec<Value>) -> Result<Ret> {
    if let Some(data) = evo.data.take() {
        args.push(data);
    }
    stack.push(args);
    Ok(Ret::none())
}

fn pop(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    match int_arg(&args, 0, 1) {
        1 => stack.tpop(),
        n if n > 1 => stack.tpops(n as usize),
        _ => {}
    }
    Ok(Ret::none())
}

fn shift(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    match int_arg(&args, 0, 1) {
        1 => stack.tshift(),
        n if n > 1 => stack.tshifts(n as usize),
        _ => {}
    }
    Ok(Ret::none())
}

fn index(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let ns: Vec<isize> = args
        .iter()
        .filter_map(Value::as_i64)
        .map(|n| n as isize)
        .collect();
    stack.tindex(&ns);
    Ok(Ret::none())
}

fn dup(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let top = stack.tops(1);
    for _ in 0..int_arg(&args, 0, 1).max(0) {
        stack.push(top.iter().cloned());
    }
    Ok(Ret::none())
}

fn dups(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let n = int_arg(&args, 0, 1);
    if n > 0 {
        let tops = stack.tops(n as usize);
        stack.push(tops);
    }
    Ok(Ret::none())
}

fn pack(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let n = int_arg(&args, 0, 1);
    let items = if n > 0 { stack.pops(n as usize) } else { Vec::new() };
    Ok(Ret::value(Value::List(items)))
}

fn part(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let beg = int_arg(&args, 0, 0) as isize;
    let end = args.get(1).and_then(Value::as_i64).map(|e| e as isize);
    Ok(Ret::value(Value::List(stack.slice(beg, end))))
}

fn vain(_: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    match int_arg(&args, 0, 1) {
        1 => {
            stack.pop();
        }
        n if n > 1 => {
            stack.pops(n as usize);
        }
        _ => {}
    }
    Ok(Ret::none())
}

fn spread(evo: &mut Evo, stack: &mut Stack, _: Vec<Value>) -> Result<Ret> {
    match evo.data.take() {
        None => {}
        Some(Value::List(items)) => stack.push(items),
        Some(Value::Str(s)) => stack.push(s.chars().map(|c| Value::Str(c.to_string()))),
        Some(other) => {
            return Err(ObtError::Instruction(format!("spread: `{}` is not iterable", other)))
        }
    }
    Ok(Ret::none())
}

/// Target test shared by `pass` and `end`
fn matches_target(evo: &Evo, vals: &[Value]) -> bool {
    if vals.is_empty() {
        evo.data.as_ref().is_some_and(Value::is_truthy)
    } else {
        evo.data.as_ref().is_some_and(|d| vals.contains(d))
    }
}

fn pass(evo: &mut Evo, args: Vec<Value>) -> Result<Ret> {
    if matches_target(evo, &args) {
        Ok(Ret::none())
    } else {
        Ok(Ret::abort())
    }
}

fn end(evo: &mut Evo, args: Vec<Value>) -> Result<Ret> {
    if matches_target(evo, &args) {
        Ok(Ret::abort())
    } else {
        Ok(Ret::none())
    }
}

/// Absent or truthy target
fn applies(evo: &Evo) -> bool {
    evo.data.as_ref().map_or(true, Value::is_truthy)
}

/// Placeholder when the target is absent or truthy, otherwise the argument
fn nil(evo: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    if !applies(evo) {
        return Ok(Ret::Done(args.into_iter().next()));
    }
    stack.undefined();
    Ok(Ret::none())
}

fn avoid(evo: &mut Evo, args: Vec<Value>) -> Result<Ret> {
    if !applies(evo) {
        return Ok(Ret::none());
    }
    evo.prevent_default();
    Ok(Ret::Done(args.into_iter().next()))
}

fn stop(evo: &mut Evo, args: Vec<Value>) -> Result<Ret> {
    if !applies(evo) {
        return Ok(Ret::none());
    }
    evo.stop_propagation();
    Ok(Ret::Done(args.into_iter().next()))
}

fn debug(evo: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Result<Ret> {
    let msg = args.first().cloned().unwrap_or_default();
    log::info!(
        "[debug] {} event={:?} target={:?} current={:?} primary={:?} updated={:?} buffer={:?} staging={:?}",
        if msg.is_nil() { String::new() } else { msg.to_string() },
        evo.event.as_ref().map(|e| e.name.as_str()),
        evo.target,
        evo.current,
        evo.primary,
        evo.updated,
        stack.buffer(),
        stack.staging()
    );
    if msg == Value::Bool(false) {
        return Ok(Ret::abort());
    }
    Ok(Ret::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evo::Event;
    use crate::pbs::Method;
    use crate::types::NodeId;

    fn run(name: &str, evo: &mut Evo, stack: &mut Stack, args: Vec<Value>) -> Ret {
        let table = table();
        let ins = table.get(name).unwrap();
        if let Some(extent) = ins.extent() {
            evo.data = stack.data(extent.count());
        }
        match ins.method() {
            Method::Plain(f) => f(evo, args).unwrap(),
            Method::Access(f) => f(evo, stack, args).unwrap(),
            Method::Prune => Ret::none(),
        }
    }

    fn ints(vs: &[i64]) -> Vec<Value> {
        vs.iter().map(|&v| Value::Int(v)).collect()
    }

    #[test]
    fn test_push_appends_target() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();
        stack.push(ints(&[9]));
        stack.tpop();
        run("push", &mut evo, &mut stack, ints(&[1, 2]));
        assert_eq!(stack.buffer(), &ints(&[1, 2, 9])[..]);
    }

    #[test]
    fn test_stack_shuffling() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();
        stack.push(ints(&[1, 2, 3]));

        run("dup", &mut evo, &mut stack, ints(&[2]));
        assert_eq!(stack.buffer(), &ints(&[1, 2, 3, 3, 3])[..]);
        run("vain", &mut evo, &mut stack, ints(&[2]));
        run("dups", &mut evo, &mut stack, ints(&[2]));
        assert_eq!(stack.buffer(), &ints(&[1, 2, 3, 2, 3])[..]);

        match run("pack", &mut evo, &mut stack, ints(&[2])) {
            Ret::Done(Some(v)) => assert_eq!(v, Value::List(ints(&[2, 3]))),
            other => panic!("unexpected {:?}", other),
        }
        match run("part", &mut evo, &mut stack, ints(&[1, -1])) {
            Ret::Done(Some(v)) => assert_eq!(v, Value::List(ints(&[2]))),
            other => panic!("unexpected {:?}", other),
        }

        run("shift", &mut evo, &mut stack, Vec::new());
        run("pop", &mut evo, &mut stack, Vec::new());
        assert_eq!(stack.staging(), &ints(&[1, 3])[..]);
    }

    #[test]
    fn test_nil_depends_on_target() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();

        // no staged target
        run("nil", &mut evo, &mut stack, Vec::new());
        assert_eq!(stack.buffer().len(), 1);
        assert!(stack.buffer()[0].is_nil());

        // truthy target is consumed, placeholder pushed
        stack.reset();
        stack.push(ints(&[4]));
        stack.tpop();
        run("nil", &mut evo, &mut stack, ints(&[8]));
        assert!(stack.staging().is_empty());
        assert_eq!(stack.buffer().len(), 1);
        assert!(stack.buffer()[0].is_nil());

        // falsy target: the argument comes back instead
        stack.reset();
        stack.push(ints(&[0]));
        stack.tpop();
        match run("nil", &mut evo, &mut stack, ints(&[8])) {
            Ret::Done(Some(v)) => assert_eq!(v, Value::Int(8)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(stack.buffer().is_empty());
    }

    #[test]
    fn test_spread() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();
        stack.push([Value::from("ab")]);
        run("spread", &mut evo, &mut stack, Vec::new());
        assert_eq!(stack.buffer(), &[Value::from("a"), Value::from("b")][..]);
    }

    #[test]
    fn test_pass_and_end() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();

        stack.push(ints(&[0]));
        assert!(run("pass", &mut evo, &mut stack, Vec::new()).is_pending());
        stack.push(ints(&[2]));
        assert!(!run("pass", &mut evo, &mut stack, ints(&[1, 2])).is_pending());
        stack.push(ints(&[2]));
        assert!(run("end", &mut evo, &mut stack, ints(&[1, 2])).is_pending());
        stack.push(ints(&[0]));
        assert!(!run("end", &mut evo, &mut stack, Vec::new()).is_pending());
    }

    #[test]
    fn test_avoid_and_stop() {
        let ev = Event::new("submit", NodeId(1));
        let mut evo = Evo::new(NodeId(1), NodeId(1));
        evo.event = Some(ev.clone());
        let mut stack = Stack::new();

        // staged falsy target: nothing happens
        stack.push(ints(&[0]));
        stack.tpop();
        assert!(matches!(run("avoid", &mut evo, &mut stack, ints(&[7])), Ret::Done(None)));
        assert!(!ev.default_prevented());

        // no staged target: unconditional
        match run("avoid", &mut evo, &mut stack, ints(&[7])) {
            Ret::Done(Some(v)) => assert_eq!(v, Value::Int(7)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ev.default_prevented());

        run("stop", &mut evo, &mut stack, Vec::new());
        assert!(ev.propagation_stopped());
    }

    #[test]
    fn test_debug_false_aborts() {
        let mut stack = Stack::new();
        let mut evo = Evo::default();
        assert!(run("debug", &mut evo, &mut stack, vec![Value::Bool(false)]).is_pending());
        assert!(!run("debug", &mut evo, &mut stack, vec![Value::from("here")]).is_pending());
    }
}
