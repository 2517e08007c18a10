//! The demonstration library exposed by the simulator.

use xlbridge::{
    Bridge, Callable, CallableDescriptor, Dispatcher, ExportId, Managed, ManagedType, RegistrationError, TaggedValue,
};

#[derive(Debug)]
struct Person {
    name: String,
}

fn object_grid() -> ManagedType {
    ManagedType::array_of(ManagedType::array_of(ManagedType::Object))
}

fn entries() -> Vec<(ExportId, CallableDescriptor, Callable)> {
    vec![
        (
            ExportId::new(1),
            CallableDescriptor::constructor("Person", vec![ManagedType::String]),
            Callable::new(|frame| Ok(Managed::object("Person", Person { name: frame.arg(0)? }))),
        ),
        (
            ExportId::new(2),
            CallableDescriptor::method("GetName", "Person", vec![], ManagedType::String),
            Callable::new(|frame| Ok(Managed::from(frame.receiver::<Person>()?.name.clone()))),
        ),
        (
            ExportId::new(3),
            CallableDescriptor::function(
                "Concat",
                "Text",
                vec![ManagedType::String, ManagedType::array_of(ManagedType::Object)],
                ManagedType::String,
            )
            .variadic(),
            Callable::new(|frame| {
                let mut text: String = frame.arg(0)?;
                for part in frame.arg::<Vec<TaggedValue>>(1)? {
                    text.push_str(&part.to_string());
                }
                Ok(Managed::String(text))
            }),
        ),
        (
            ExportId::new(4),
            CallableDescriptor::function(
                "Sum",
                "Maths",
                vec![ManagedType::array_of(ManagedType::Double)],
                ManagedType::Double,
            ),
            Callable::new(|frame| Ok(Managed::Double(frame.arg::<Vec<f64>>(0)?.iter().sum()))),
        ),
        (
            ExportId::new(5),
            CallableDescriptor::function("Transpose", "Maths", vec![object_grid()], object_grid()),
            Callable::new(|frame| {
                let rows: Vec<Vec<Managed>> = frame.arg(0)?;
                let width = rows.first().map_or(0, Vec::len);
                let columns = (0..width)
                    .map(|c| {
                        let column = rows.iter().map(|row| row.get(c).cloned().unwrap_or(Managed::Null));
                        Managed::array(ManagedType::Object, column.collect())
                    })
                    .collect();
                Ok(Managed::array(ManagedType::array_of(ManagedType::Object), columns))
            }),
        ),
        (
            ExportId::new(6),
            CallableDescriptor::function(
                "Construct",
                "Reflection",
                vec![ManagedType::String, ManagedType::array_of(ManagedType::Value)],
                ManagedType::Object,
            )
            .variadic(),
            Callable::new(|frame| {
                let class: String = frame.arg(0)?;
                let args: Vec<TaggedValue> = frame.arg(1)?;
                Ok(Managed::Value(frame.dispatcher().invoke_by_name(&class, &args)?))
            }),
        ),
        (
            ExportId::new(7),
            CallableDescriptor::function("Add", "Maths", vec![ManagedType::Int, ManagedType::Int], ManagedType::Int),
            Callable::new(|frame| {
                let a: i32 = frame.arg(0)?;
                let b: i32 = frame.arg(1)?;
                a.checked_add(b)
                    .map(Managed::Int)
                    .ok_or_else(|| format!("Add: {a} + {b} overflows int").into())
            }),
        ),
    ]
}

/// Builds a dispatcher with every demonstration export registered.
pub fn dispatcher(bridge: Bridge) -> Result<Dispatcher, RegistrationError> {
    let mut builder = Dispatcher::builder(bridge);
    builder.register_all(entries())?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use xlbridge::{BridgeConfig, ErrorCode, HostArray};

    use super::*;

    fn demo() -> Dispatcher {
        dispatcher(Bridge::new(BridgeConfig::default())).unwrap()
    }

    fn num(n: f64) -> TaggedValue {
        TaggedValue::Number(n)
    }

    #[test]
    fn add_is_export_seven() {
        let demo = demo();
        assert_eq!(demo.invoke(ExportId::new(7), &[num(2.0), num(3.0)]), Ok(num(5.0)));
        assert_eq!(
            demo.invoke(ExportId::new(7), &[num(f64::from(i32::MAX)), num(1.0)]),
            Ok(TaggedValue::Error(ErrorCode::Null))
        );
    }

    #[test]
    fn concat_renders_the_raw_tail() {
        let demo = demo();
        let result = demo.invoke_by_name("Concat", &["n=".into(), num(4.0), "!".into(), TaggedValue::Boolean(true)]);
        assert_eq!(result, Ok(TaggedValue::from("n=4!TRUE")));
        assert_eq!(demo.invoke_by_name("Concat", &["alone".into()]), Ok(TaggedValue::from("alone")));
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let demo = demo();
        let grid = HostArray::from_rows(vec![vec![num(1.0), "a".into()], vec![num(2.0), TaggedValue::Nil]]);
        let expected = HostArray::from_rows(vec![vec![num(1.0), num(2.0)], vec!["a".into(), TaggedValue::Nil]]);
        assert_eq!(demo.invoke_by_name("Transpose", &[grid.into()]), Ok(TaggedValue::from(expected)));
    }

    #[test]
    fn construct_builds_a_person_by_name() {
        let demo = demo();
        let Ok(TaggedValue::Object(handle)) = demo.invoke_by_name("Construct", &["Person".into(), "Ada".into()]) else {
            panic!("expected a handle");
        };
        assert_eq!(
            demo.invoke_by_name("GetName", &[TaggedValue::Object(handle)]),
            Ok(TaggedValue::from("Ada"))
        );
    }
}
