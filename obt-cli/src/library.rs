//! Demo instruction library
//!
//! A handful of arithmetic, string and document instructions so scenes can
//! do something visible. The control set from `obt_core` is merged into the
//! call tables.

use crate::document::{Document, Node};
use crate::selector::Element;
use obt_core::{control, Extent, Instruction, InstructionTable, ObtError, Pbs, Result, Ret, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Build the four instruction tables over `doc`
pub fn pbs(doc: &Rc<RefCell<Document>>) -> Result<Pbs> {
    let mut calls = calls(doc);
    calls.merge(&control::table())?;

    Ok(Pbs {
        on: calls.clone(),
        by: calls.clone(),
        update: updates(doc),
        next: calls,
    })
}

fn calls(doc: &Rc<RefCell<Document>>) -> InstructionTable {
    let d = Rc::clone(doc);
    InstructionTable::new()
        .with(
            "add",
            Instruction::plain(|evo, args| {
                fold("add", operands(evo.data.take(), args), i64::checked_add, |a, b| a + b)
                    .map(Ret::value)
            })
            .with_extent(Extent::Take(2)),
        )
        .with(
            "sub",
            Instruction::plain(|evo, args| {
                fold("sub", operands(evo.data.take(), args), i64::checked_sub, |a, b| a - b)
                    .map(Ret::value)
            })
            .with_extent(Extent::Take(1)),
        )
        .with(
            "mul",
            Instruction::plain(|evo, args| {
                fold("mul", operands(evo.data.take(), args), i64::checked_mul, |a, b| a * b)
                    .map(Ret::value)
            })
            .with_extent(Extent::Take(2)),
        )
        .with(
            "concat",
            Instruction::plain(|evo, args| {
                let text: String = operands(evo.data.take(), args)
                    .iter()
                    .map(Value::to_string)
                    .collect();
                Ok(Ret::value(text))
            })
            .with_extent(Extent::Take(2)),
        )
        .with(
            "attr",
            Instruction::plain(move |evo, args| {
                let name = name_arg(&args, "attr")?;
                let node = evo.data.take().and_then(|v| v.as_node()).or(evo.delegate);
                let found = {
                    let doc = d.borrow();
                    node.and_then(|n| doc.node(n))
                        .and_then(|n| n.attr(name).map(Value::from))
                };
                Ok(Ret::Done(found))
            })
            .with_extent(Extent::Optional(1)),
        )
        .with(
            "defer",
            Instruction::plain(|evo, args| {
                let value = evo.data.take().or_else(|| args.into_iter().next());
                Ok(Ret::pending(async move { Ok(value) }))
            })
            .with_extent(Extent::Optional(1)),
        )
        .with(
            "fail",
            Instruction::plain(|_, args| {
                let msg = args.first().map(Value::to_string).unwrap_or_else(|| "failed".into());
                Ok(Ret::reject(format!("err: {}", msg)))
            }),
        )
}

fn updates(doc: &Rc<RefCell<Document>>) -> InstructionTable {
    InstructionTable::new()
        .with(
            "attr",
            update(doc, |node, args, value| {
                let name = name_arg(args, "attr")?;
                match value {
                    Some(v) if *v != Value::Null => node.set_attr(name, &v.to_string()),
                    _ => node.remove_attr(name),
                }
                Ok(())
            }),
        )
        .with(
            "prop",
            update(doc, |node, args, value| {
                let name = name_arg(args, "prop")?;
                match value {
                    Some(v) => node.props.insert(name.to_string(), v.clone()),
                    None => node.props.remove(name),
                };
                Ok(())
            }),
        )
        .with(
            "css",
            update(doc, |node, args, value| {
                let name = name_arg(args, "css")?;
                match value {
                    Some(v) if *v != Value::Null => {
                        node.styles.insert(name.to_string(), v.to_string());
                    }
                    _ => {
                        node.styles.remove(name);
                    }
                }
                Ok(())
            }),
        )
        .with(
            "toggleAttr",
            update(doc, |node, args, value| {
                let name = name_arg(args, "toggleAttr")?;
                let on = match value {
                    Some(force) => force.is_truthy(),
                    None => node.attr(name).is_none(),
                };
                if on {
                    node.set_attr(name, "");
                } else {
                    node.remove_attr(name);
                }
                Ok(())
            }),
        )
        .with(
            "text",
            update(doc, |node, _, value| {
                node.text = value.map(Value::to_string).unwrap_or_default();
                Ok(())
            }),
        )
        .with(
            "addClass",
            update(doc, |node, args, value| {
                let names: Vec<String> = if args.is_empty() {
                    value
                        .map(|v| v.to_string().split_whitespace().map(String::from).collect())
                        .unwrap_or_default()
                } else {
                    args.iter().map(Value::to_string).collect()
                };
                names.iter().for_each(|c| node.add_class(c));
                Ok(())
            }),
        )
}

/// Update instruction applying `apply` to every node in `evo.updated`
fn update<F>(doc: &Rc<RefCell<Document>>, apply: F) -> Instruction
where
    F: Fn(&mut Node, &[Value], Option<&Value>) -> Result<()> + 'static,
{
    let doc = Rc::clone(doc);
    Instruction::plain(move |evo, args| {
        let value = evo.data.take();
        let targets = evo.updated.as_ref().map(Value::nodes).unwrap_or_default();
        let mut doc = doc.borrow_mut();
        for id in targets {
            if let Some(node) = doc.node_mut(id) {
                apply(node, &args, value.as_ref())?;
            }
        }
        Ok(Ret::none())
    })
}

fn name_arg<'a>(args: &'a [Value], method: &str) -> Result<&'a str> {
    args.first()
        .and_then(Value::as_str)
        .ok_or_else(|| ObtError::Instruction(format!("{}: missing name argument", method)))
}

/// Materialized data first, then the template arguments
fn operands(data: Option<Value>, args: Vec<Value>) -> Vec<Value> {
    let mut out = match data {
        Some(Value::List(items)) => items,
        Some(v) => vec![v],
        None => Vec::new(),
    };
    out.extend(args);
    out
}

/// Left fold keeping integers exact until overflow or a float operand
fn fold(
    name: &str,
    vals: Vec<Value>,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value> {
    let mut iter = vals.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| ObtError::Instruction(format!("{}: no operands", name)))?;

    iter.try_fold(first, |acc, v| match (&acc, &v) {
        (Value::Int(a), Value::Int(b)) => Ok(int_op(*a, *b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(float_op(*a as f64, *b as f64)))),
        _ => match (acc.as_f64(), v.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(ObtError::Instruction(format!(
                "{}: `{}` and `{}` are not numbers",
                name, acc, v
            ))),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use obt_core::{Evo, NodeId};

    fn call(pbs: &Pbs, name: &str, evo: &mut Evo, args: Vec<Value>) -> Ret {
        let ins = pbs.resolve(obt_core::Phase::By, name).unwrap();
        match ins.method() {
            obt_core::pbs::Method::Plain(f) => f(evo, args).unwrap(),
            _ => panic!("`{}` is not a plain instruction", name),
        }
    }

    fn done(ret: Ret) -> Option<Value> {
        match ret {
            Ret::Done(v) => v,
            Ret::Pending(_) => panic!("unexpected pending"),
        }
    }

    #[test]
    fn test_arithmetic() {
        let doc = Rc::new(RefCell::new(Document::new()));
        let pbs = pbs(&doc).unwrap();
        let mut evo = Evo::default();

        evo.data = Some(Value::List(vec![Value::Int(2), Value::Int(3)]));
        assert_eq!(done(call(&pbs, "add", &mut evo, vec![Value::Int(4)])), Some(Value::Int(9)));

        evo.data = Some(Value::Int(10));
        assert_eq!(done(call(&pbs, "sub", &mut evo, vec![Value::Int(3)])), Some(Value::Int(7)));

        evo.data = Some(Value::List(vec![Value::Int(2), Value::Float(1.5)]));
        assert_eq!(done(call(&pbs, "mul", &mut evo, vec![])), Some(Value::Float(3.0)));

        evo.data = Some(Value::List(vec![Value::from("a"), Value::Int(1)]));
        assert_eq!(done(call(&pbs, "concat", &mut evo, vec![])), Some(Value::from("a1")));
    }

    #[test]
    fn test_fold_errors() {
        assert!(fold("add", vec![], i64::checked_add, |a, b| a + b).is_err());
        assert!(fold("add", vec![Value::Int(1), Value::Null], i64::checked_add, |a, b| a + b).is_err());
        assert_eq!(
            fold("add", vec![Value::Int(i64::MAX), Value::Int(1)], i64::checked_add, |a, b| a + b).unwrap(),
            Value::Float(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn test_attr_getter_uses_delegate() {
        let doc = Rc::new(RefCell::new(Document::new()));
        let a = doc.borrow_mut().create("a", None);
        doc.borrow_mut().node_mut(a).unwrap().set_attr("href", "/x");
        let pbs = pbs(&doc).unwrap();

        let mut evo = Evo::new(a, a);
        let got = done(call(&pbs, "attr", &mut evo, vec![Value::from("href")]));
        assert_eq!(got, Some(Value::from("/x")));

        let mut evo = Evo::new(Document::ROOT, Document::ROOT);
        evo.data = Some(Value::Node(a));
        let missing = done(call(&pbs, "attr", &mut evo, vec![Value::from("title")]));
        assert_eq!(missing, None);
    }

    #[test]
    fn test_updates_apply_to_all_targets() {
        let doc = Rc::new(RefCell::new(Document::new()));
        let ids: Vec<NodeId> = (0..2).map(|_| doc.borrow_mut().create("p", None)).collect();
        let pbs = pbs(&doc).unwrap();

        let mut evo = Evo::default();
        evo.updated = Some(Value::List(ids.iter().copied().map(Value::Node).collect()));
        for (name, args, data) in [
            ("attr", vec![Value::from("title")], Some(Value::from("hi"))),
            ("css", vec![Value::from("color")], Some(Value::from("red"))),
            ("text", vec![], Some(Value::Int(5))),
            ("addClass", vec![], Some(Value::from("a b"))),
            ("toggleAttr", vec![Value::from("hidden")], None),
        ] {
            evo.data = data;
            let ins = pbs.resolve(obt_core::Phase::Update, name).unwrap();
            if let obt_core::pbs::Method::Plain(f) = ins.method() {
                f(&mut evo, args).unwrap();
            }
        }

        let doc = doc.borrow();
        for id in ids {
            let node = doc.node(id).unwrap();
            assert_eq!(node.attr("title"), Some("hi"));
            assert_eq!(node.styles.get("color").map(String::as_str), Some("red"));
            assert_eq!(node.text, "5");
            assert_eq!(node.classes, vec!["a", "b"]);
            assert_eq!(node.attr("hidden"), Some(""));
        }
    }

    #[test]
    fn test_update_without_name_fails() {
        let doc = Rc::new(RefCell::new(Document::new()));
        let p = doc.borrow_mut().create("p", None);
        let pbs = pbs(&doc).unwrap();
        let mut evo = Evo::default();
        evo.updated = Some(Value::Node(p));

        let ins = pbs.resolve(obt_core::Phase::Update, "prop").unwrap();
        if let obt_core::pbs::Method::Plain(f) = ins.method() {
            assert!(f(&mut evo, vec![]).is_err());
        }
    }
}
