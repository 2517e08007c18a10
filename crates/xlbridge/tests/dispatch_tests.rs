//! End-to-end tests for the dispatcher and invoker: registration, argument marshalling,
//! receivers, variadic tails, overloads, failures and concurrent calls.

use std::{
    sync::{Arc, Mutex},
    thread,
};

use pretty_assertions::assert_eq;
use xlbridge::{
    Bridge, BridgeConfig, Callable, CallableDescriptor, CallableKind, Dispatcher, ErrorCode, ExportId, Handle,
    HostArray, InvocationError, Managed, ManagedType, ObjectHandle, ObjectRef, RegistrationError, TaggedValue,
    UnknownExport,
};

#[derive(Debug)]
struct Person {
    name: String,
}

const ADD: ExportId = ExportId::new(7);
const PERSON: ExportId = ExportId::new(1);
const GET_NAME: ExportId = ExportId::new(2);
const TAIL: ExportId = ExportId::new(3);
const FAIL: ExportId = ExportId::new(4);
const PANIC: ExportId = ExportId::new(5);
const LOG: ExportId = ExportId::new(6);
const NOTHING: ExportId = ExportId::new(8);
const SHAPE: ExportId = ExportId::new(9);
const SUM: ExportId = ExportId::new(10);
const SECRET: ExportId = ExportId::new(11);
const CONSTRUCT: ExportId = ExportId::new(20);
const PICK_INT: ExportId = ExportId::new(30);
const PICK_STRING: ExportId = ExportId::new(31);

const ALL: [ExportId; 14] = [
    ADD,
    PERSON,
    GET_NAME,
    TAIL,
    FAIL,
    PANIC,
    LOG,
    NOTHING,
    SHAPE,
    SUM,
    SECRET,
    CONSTRUCT,
    PICK_INT,
    PICK_STRING,
];

/// Arguments seen by the last call to `Tail`.
type Seen = Arc<Mutex<Vec<Managed>>>;

struct Fixture {
    dispatcher: Dispatcher,
    seen: Seen,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    fn with_config(config: BridgeConfig) -> Self {
        let seen = Seen::default();
        let mut builder = Dispatcher::builder(Bridge::new(config));
        builder
            .register(
                ADD,
                CallableDescriptor::function("Add", "Maths", vec![ManagedType::Int, ManagedType::Int], ManagedType::Int),
                Callable::new(|frame| Ok(Managed::Int(frame.arg::<i32>(0)? + frame.arg::<i32>(1)?))),
            )
            .unwrap()
            .register(
                PERSON,
                CallableDescriptor::constructor("Person", vec![ManagedType::String]),
                Callable::new(|frame| Ok(Managed::object("Person", Person { name: frame.arg(0)? }))),
            )
            .unwrap()
            .register(
                GET_NAME,
                CallableDescriptor::method("GetName", "Person", vec![], ManagedType::String),
                Callable::new(|frame| Ok(Managed::from(frame.receiver::<Person>()?.name.clone()))),
            )
            .unwrap();

        let tail_seen = Arc::clone(&seen);
        builder
            .register(
                TAIL,
                CallableDescriptor::function(
                    "Tail",
                    "Demo",
                    vec![
                        ManagedType::Int,
                        ManagedType::Int,
                        ManagedType::array_of(ManagedType::Object),
                    ],
                    ManagedType::Int,
                )
                .variadic(),
                Callable::new(move |frame| {
                    *tail_seen.lock().unwrap() = frame.args().to_vec();
                    let Some(Managed::Array(tail)) = frame.args().last() else {
                        return Err("tail is not an array".into());
                    };
                    Ok(Managed::Int(i32::try_from(tail.items.len()).map_err(|e| e.to_string())?))
                }),
            )
            .unwrap()
            .register(
                FAIL,
                CallableDescriptor::function("Fail", "Demo", vec![], ManagedType::Int),
                Callable::new(|_| Err(InvocationError::new("deliberate failure"))),
            )
            .unwrap()
            .register(
                PANIC,
                CallableDescriptor::function("Panic", "Demo", vec![], ManagedType::Int),
                Callable::new(|_| panic!("deliberate panic")),
            )
            .unwrap()
            .register(
                LOG,
                CallableDescriptor::function("Log", "Demo", vec![ManagedType::String], None::<ManagedType>),
                Callable::new(|_| Ok(Managed::Null)),
            )
            .unwrap()
            .register(
                NOTHING,
                CallableDescriptor::function("Nothing", "Demo", vec![], ManagedType::String),
                Callable::new(|_| Ok(Managed::Null)),
            )
            .unwrap()
            .register(
                SHAPE,
                CallableDescriptor::function("Shape", "Demo", vec![ManagedType::Object], ManagedType::String),
                Callable::new(|frame| {
                    Ok(Managed::from(match frame.arg::<TaggedValue>(0) {
                        Ok(TaggedValue::Array(array)) => format!("{}x{}", array.rows(), array.columns()),
                        _ => "scalar".to_owned(),
                    }))
                }),
            )
            .unwrap()
            .register(
                SUM,
                CallableDescriptor::function(
                    "Sum",
                    "Maths",
                    vec![ManagedType::array_of(ManagedType::Double)],
                    ManagedType::Double,
                ),
                Callable::new(|frame| Ok(Managed::Double(frame.arg::<Vec<f64>>(0)?.iter().sum()))),
            )
            .unwrap()
            .register(
                SECRET,
                CallableDescriptor::function("Secret", "Demo", vec![], ManagedType::Object),
                Callable::new(|_| Ok(Managed::object("Secret", 42_u8))),
            )
            .unwrap()
            .register(
                CONSTRUCT,
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
            )
            .unwrap()
            .register(
                PICK_INT,
                CallableDescriptor::function("Pick", "Demo", vec![ManagedType::Int], ManagedType::String),
                Callable::new(|frame| Ok(Managed::from(format!("int {}", frame.arg::<i32>(0)?)))),
            )
            .unwrap()
            .register(
                PICK_STRING,
                CallableDescriptor::function("Pick", "Demo", vec![ManagedType::String], ManagedType::String),
                Callable::new(|_| Err("string overload always fails".into())),
            )
            .unwrap();

        Self {
            dispatcher: builder.build(),
            seen,
        }
    }

    fn call(&self, id: ExportId, args: &[TaggedValue]) -> TaggedValue {
        self.dispatcher.invoke(id, args).expect("export should be registered")
    }

    fn new_person(&self, name: &str) -> ObjectHandle {
        match self.call(PERSON, &[name.into()]) {
            TaggedValue::Object(handle) => handle,
            other => panic!("expected an object handle, got {other:?}"),
        }
    }
}

fn num(n: f64) -> TaggedValue {
    TaggedValue::Number(n)
}

// =============================================================================
// 1. Static calls and return values
// =============================================================================

#[test]
fn add_returns_a_number() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(ADD, &[num(2.0), num(3.0)]), num(5.0));
}

#[test]
fn numeric_strings_are_accepted_for_int_parameters() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(ADD, &[num(2.0), "40".into()]), num(42.0));
}

#[test]
fn void_function_returns_nil() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(LOG, &["hello".into()]), TaggedValue::Nil);
}

#[test]
fn null_result_is_a_null_error() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(NOTHING, &[]), TaggedValue::Error(ErrorCode::Null));
}

#[test]
fn unconvertible_result_is_minted() {
    let fixture = Fixture::new();
    let TaggedValue::Object(handle) = fixture.call(SECRET, &[]) else {
        panic!("expected an object handle");
    };
    assert_eq!(handle.class.as_str(), "Secret");
    let object = fixture.dispatcher.bridge().get_object(handle.handle).unwrap();
    assert_eq!(object.downcast_ref::<u8>(), Some(&42));
}

// =============================================================================
// 2. Argument count and shape
// =============================================================================

#[test]
fn too_many_arguments_is_a_value_error() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.call(ADD, &[num(1.0), num(2.0), num(3.0)]),
        TaggedValue::Error(ErrorCode::Value)
    );
}

#[test]
fn missing_arguments_arrive_as_null() {
    let fixture = Fixture::new();
    // Add cannot read its second argument as an int, so the call itself fails
    assert_eq!(fixture.call(ADD, &[num(1.0)]), TaggedValue::Error(ErrorCode::Null));
}

#[test]
fn arrays_reach_object_parameters_structurally() {
    let fixture = Fixture::new();
    let grid = HostArray::from_rows(vec![vec![num(1.0), num(2.0), num(3.0)], vec![num(4.0), num(5.0), num(6.0)]]);
    assert_eq!(fixture.call(SHAPE, &[grid.into()]), TaggedValue::from("2x3"));
    assert_eq!(fixture.call(SHAPE, &[num(1.0)]), TaggedValue::from("scalar"));
}

#[test]
fn column_decodes_into_a_double_array() {
    let fixture = Fixture::new();
    let column = HostArray::column([num(1.0), num(2.0), num(3.5)]);
    assert_eq!(fixture.call(SUM, &[column.into()]), num(6.5));
}

#[test]
fn unconvertible_argument_is_a_value_error() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.call(ADD, &[num(1.0), TaggedValue::Boolean(true)]),
        TaggedValue::Error(ErrorCode::Value)
    );
}

// =============================================================================
// 3. Constructors and instance methods
// =============================================================================

#[test]
fn constructor_then_method() {
    let fixture = Fixture::new();
    let handle = fixture.new_person("Ada");
    assert_eq!(handle.class.as_str(), "Person");
    assert_eq!(
        fixture.call(GET_NAME, &[TaggedValue::Object(handle)]),
        TaggedValue::from("Ada")
    );
}

#[test]
fn constructed_object_is_retrievable_from_the_bridge() {
    let fixture = Fixture::new();
    let handle = fixture.new_person("Grace");
    let object = fixture.dispatcher.bridge().get_object(handle.handle).unwrap();
    assert_eq!(object.downcast_ref::<Person>().map(|p| p.name.as_str()), Some("Grace"));
}

#[test]
fn stale_receiver_is_a_ref_error() {
    let fixture = Fixture::new();
    let stale = ObjectHandle::new("Person", Handle::new(9999));
    assert_eq!(
        fixture.call(GET_NAME, &[TaggedValue::Object(stale)]),
        TaggedValue::Error(ErrorCode::Ref)
    );
}

#[test]
fn released_receiver_is_a_ref_error() {
    let fixture = Fixture::new();
    let handle = fixture.new_person("Ada");
    assert!(fixture.dispatcher.bridge().heap().release(handle.handle));
    assert_eq!(
        fixture.call(GET_NAME, &[TaggedValue::Object(handle)]),
        TaggedValue::Error(ErrorCode::Ref)
    );
}

#[test]
fn receiver_of_another_class_is_a_value_error() {
    let fixture = Fixture::new();
    let handle = fixture.dispatcher.bridge().heap().mint(ObjectRef::new("Account", 1_u32));
    assert_eq!(
        fixture.call(GET_NAME, &[TaggedValue::Object(ObjectHandle::new("Account", handle))]),
        TaggedValue::Error(ErrorCode::Value)
    );
}

#[test]
fn instance_call_without_receiver_is_a_null_error() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(GET_NAME, &[]), TaggedValue::Error(ErrorCode::Null));
    assert_eq!(fixture.call(GET_NAME, &[TaggedValue::Nil]), TaggedValue::Error(ErrorCode::Null));
}

#[test]
fn handle_strings_are_coerced_to_handles() {
    let fixture = Fixture::new();
    let handle = fixture.new_person("Ada");
    let text = handle.to_host_string('&');
    assert_eq!(fixture.call(GET_NAME, &[text.into()]), TaggedValue::from("Ada"));
}

#[test]
fn handle_string_coercion_can_be_disabled() {
    let config = BridgeConfig {
        coerce_handle_strings: false,
        ..BridgeConfig::default()
    };
    let fixture = Fixture::with_config(config);
    let handle = fixture.new_person("Ada");
    let text = handle.to_host_string('&');
    assert_eq!(fixture.call(GET_NAME, &[text.into()]), TaggedValue::Error(ErrorCode::Value));
}

// =============================================================================
// 4. Variadic tails
// =============================================================================

#[test]
fn variadic_tail_length_follows_argument_count() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(TAIL, &[num(1.0), num(2.0)]), num(0.0));
    assert_eq!(fixture.call(TAIL, &[num(1.0), num(2.0), "x".into()]), num(1.0));
    assert_eq!(fixture.call(TAIL, &[num(1.0), num(2.0), "x".into(), num(4.0)]), num(2.0));
}

#[test]
fn variadic_tail_is_passed_unconverted() {
    let fixture = Fixture::new();
    let stale = TaggedValue::Object(ObjectHandle::new("Person", Handle::new(9999)));
    assert_eq!(
        fixture.call(TAIL, &[num(1.0), num(2.0), "x".into(), stale.clone()]),
        num(2.0)
    );
    let seen = fixture.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Managed::Int(1),
            Managed::Int(2),
            Managed::array(
                ManagedType::Object,
                vec![Managed::Value("x".into()), Managed::Value(stale)]
            ),
        ]
    );
}

#[test]
fn short_variadic_call_pads_fixed_parameters() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(TAIL, &[num(1.0)]), num(0.0));
    let seen = fixture.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Managed::Int(1),
            Managed::Null,
            Managed::array(ManagedType::Object, Vec::new())
        ]
    );
}

#[test]
fn nested_construct_returns_the_inner_handle() {
    let fixture = Fixture::new();
    let before = fixture.dispatcher.bridge().heap().stats().minted;
    let result = fixture
        .dispatcher
        .invoke_by_name("Construct", &["Person".into(), "Ada".into()])
        .unwrap();
    let TaggedValue::Object(handle) = result else {
        panic!("expected an object handle, got {result:?}");
    };
    assert_eq!(handle.class.as_str(), "Person");
    assert_eq!(fixture.dispatcher.bridge().heap().stats().minted, before + 1);
    assert_eq!(
        fixture.call(GET_NAME, &[TaggedValue::Object(handle)]),
        TaggedValue::from("Ada")
    );
}

#[test]
fn nested_construct_of_unknown_class_fails_the_outer_call() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.call(CONSTRUCT, &["Unicorn".into()]),
        TaggedValue::Error(ErrorCode::Null)
    );
}

// =============================================================================
// 5. Failures
// =============================================================================

#[test]
fn returned_error_is_a_null_error() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(FAIL, &[]), TaggedValue::Error(ErrorCode::Null));
}

#[test]
fn panic_is_contained() {
    let fixture = Fixture::new();
    assert_eq!(fixture.call(PANIC, &[]), TaggedValue::Error(ErrorCode::Null));
    // the dispatcher is still usable afterwards
    assert_eq!(fixture.call(ADD, &[num(1.0), num(1.0)]), num(2.0));
}

#[test]
fn unknown_export_id_is_an_err() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.dispatcher.invoke(ExportId::new(999), &[]),
        Err(UnknownExport::Id(ExportId::new(999)))
    );
}

#[test]
fn unknown_name_is_an_err() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.dispatcher.invoke_by_name("Nope", &[]),
        Err(UnknownExport::Name("Nope".to_owned()))
    );
}

// =============================================================================
// 6. Overloads
// =============================================================================

#[test]
fn first_successful_overload_wins() {
    let fixture = Fixture::new();
    assert_eq!(fixture.dispatcher.overloads("Pick"), &[PICK_INT, PICK_STRING]);
    assert_eq!(
        fixture.dispatcher.invoke_by_name("Pick", &[num(4.0)]),
        Ok(TaggedValue::from("int 4"))
    );
    // "12" decodes as an int, so the failing string overload is never reached
    assert_eq!(
        fixture.dispatcher.invoke_by_name("Pick", &["12".into()]),
        Ok(TaggedValue::from("int 12"))
    );
}

#[test]
fn last_error_is_returned_when_every_overload_fails() {
    let fixture = Fixture::new();
    // the int overload fails with #VALUE!, the string overload with #NULL!
    assert_eq!(
        fixture.dispatcher.invoke_by_name("Pick", &["abc".into()]),
        Ok(TaggedValue::Error(ErrorCode::Null))
    );
}

#[test]
fn empty_overload_list_is_a_name_error() {
    let fixture = Fixture::new();
    assert_eq!(
        fixture.dispatcher.invoke_overloads(&[], &[]),
        Ok(TaggedValue::Error(ErrorCode::Name))
    );
    assert!(fixture.dispatcher.overloads("Nope").is_empty());
}

// =============================================================================
// 7. Registration
// =============================================================================

#[test]
fn duplicate_export_is_rejected() {
    let mut builder = Dispatcher::builder(Bridge::default());
    let descriptor = CallableDescriptor::function("One", "Demo", vec![], ManagedType::Int);
    let callable = Callable::new(|_| Ok(Managed::Int(1)));
    builder.register(ADD, descriptor.clone(), callable.clone()).unwrap();
    assert_eq!(
        builder.register(ADD, descriptor, callable).unwrap_err(),
        RegistrationError::DuplicateExport(ADD)
    );
}

#[test]
fn variadic_descriptor_needs_a_trailing_array() {
    let mut builder = Dispatcher::builder(Bridge::default());
    let descriptor = CallableDescriptor::function("Bad", "Demo", vec![ManagedType::Int], ManagedType::Int).variadic();
    let err = builder
        .register(ExportId::new(1), descriptor, Callable::new(|_| Ok(Managed::Int(1))))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidDescriptor { ref name, .. } if name == "Bad"));
}

#[test]
fn register_all_stops_at_first_error() {
    let mut builder = Dispatcher::builder(Bridge::default());
    let entry = |id: u32| {
        (
            ExportId::new(id),
            CallableDescriptor::function("One", "Demo", vec![], ManagedType::Int),
            Callable::new(|_| Ok(Managed::Int(1))),
        )
    };
    let err = builder.register_all([entry(1), entry(2), entry(1), entry(3)]).unwrap_err();
    assert_eq!(err, RegistrationError::DuplicateExport(ExportId::new(1)));
    let dispatcher = builder.build();
    assert_eq!(dispatcher.exports().len(), 2);
}

#[test]
fn exports_are_listed_in_id_order() {
    let fixture = Fixture::new();
    let ids: Vec<ExportId> = fixture.dispatcher.exports().into_iter().map(|(id, _)| id).collect();
    let mut expected = ALL.to_vec();
    expected.sort();
    assert_eq!(ids, expected);

    let exports = fixture.dispatcher.exports();
    let (_, constructor) = exports.iter().find(|(id, _)| *id == PERSON).unwrap();
    assert_eq!(constructor.kind(), CallableKind::Constructor);
    assert_eq!(constructor.name(), "Person");
    assert_eq!(constructor.to_string(), "Person(String) -> Person");
}

#[test]
fn verify_exports_reports_both_directions() {
    let fixture = Fixture::new();
    assert_eq!(fixture.dispatcher.verify_exports(ALL), Ok(()));

    let mut expected: Vec<ExportId> = ALL.iter().copied().filter(|id| *id != ADD).collect();
    expected.push(ExportId::new(99));
    assert_eq!(
        fixture.dispatcher.verify_exports(expected),
        Err(RegistrationError::ExportMismatch {
            missing: vec![ExportId::new(99)],
            unexpected: vec![ADD],
        })
    );
}

#[test]
fn variadic_descriptor_display_uses_ellipsis() {
    let fixture = Fixture::new();
    let exports = fixture.dispatcher.exports();
    let (_, construct) = exports.iter().find(|(id, _)| *id == CONSTRUCT).unwrap();
    assert_eq!(construct.to_string(), "Construct(String, Value...) -> Object");
    assert_eq!(construct.variadic_element(), Some(&ManagedType::Value));
}

// =============================================================================
// 8. Concurrency
// =============================================================================

#[test]
fn concurrent_calls_are_independent() {
    const THREADS: u32 = 8;
    const CALLS: u32 = 100;
    const TOTAL: usize = (THREADS * CALLS) as usize;

    let fixture = Fixture::new();
    let dispatcher = &fixture.dispatcher;
    thread::scope(|scope| {
        for t in 0..THREADS {
            scope.spawn(move || {
                for i in 0..CALLS {
                    let a = f64::from(t);
                    let b = f64::from(i);
                    assert_eq!(dispatcher.invoke(ADD, &[num(a), num(b)]), Ok(num(a + b)));

                    let name = format!("p{t}-{i}");
                    let Ok(TaggedValue::Object(handle)) = dispatcher.invoke(PERSON, &[name.as_str().into()]) else {
                        panic!("constructor failed");
                    };
                    assert_eq!(
                        dispatcher.invoke(GET_NAME, &[TaggedValue::Object(handle)]),
                        Ok(TaggedValue::from(name))
                    );
                }
            });
        }
    });

    let stats = dispatcher.bridge().heap().stats();
    assert_eq!(stats.minted, TOTAL);
}
