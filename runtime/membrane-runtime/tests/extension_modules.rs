#![allow(clippy::approx_constant)]

use membrane_core::{KindId, LockState, NativeValue};
use membrane_runtime::{Host, HostConfig, HostError};

fn host() -> Host {
    Host::new(HostConfig::default()).unwrap()
}

fn raised(err: HostError) -> membrane_core::Exception {
    match err {
        HostError::Raised(exception) => exception,
        other => panic!("expected a raised error, got {other}"),
    }
}

mod simple {
    use super::*;

    #[test]
    fn hello() {
        let out = host().call("simple", "hello", vec![]).unwrap();
        assert_eq!(out, NativeValue::str("Hello from C!"));
    }

    #[test]
    fn add() {
        let host = host();
        assert_eq!(host.call("simple", "add", vec![NativeValue::Int(1), NativeValue::Int(2)]).unwrap(), NativeValue::Int(3));
        assert_eq!(host.call("simple", "add", vec![NativeValue::Int(-5), NativeValue::Int(10)]).unwrap(), NativeValue::Int(5));
    }

    #[test]
    fn fib() {
        let host = host();
        for (n, expected) in [(0, 0), (1, 1), (10, 55), (20, 6765)] {
            assert_eq!(host.call("simple", "fib", vec![NativeValue::Int(n)]).unwrap(), NativeValue::Int(expected));
        }
    }

    #[test]
    fn fib_rejects_negative() {
        let exception = raised(host().call("simple", "fib", vec![NativeValue::Int(-1)]).unwrap_err());
        assert_eq!(exception.kind(), KindId::TYPE_ERROR);
        assert_eq!(exception.message(), "fib() argument 'n' value -1 out of range for u64");
    }
}

mod args {
    use super::*;

    #[test]
    fn no_args() {
        assert_eq!(host().call("args", "no_args", vec![]).unwrap(), NativeValue::None);
    }

    #[test]
    fn single_arg() {
        let host = host();
        assert_eq!(host.call("args", "single_arg", vec![NativeValue::Int(42)]).unwrap(), NativeValue::Int(42));
        assert_eq!(host.call("args", "single_arg", vec!["hello".into()]).unwrap(), NativeValue::str("hello"));
    }

    #[test]
    fn pos_args() {
        let host = host();
        assert_eq!(
            host.call("args", "pos_args", vec![NativeValue::Int(1), NativeValue::Int(2)]).unwrap(),
            NativeValue::tuple([1, 2])
        );
        assert_eq!(
            host.call("args", "pos_args", vec!["a".into(), "b".into()]).unwrap(),
            NativeValue::tuple(["a", "b"])
        );
    }

    #[test]
    fn kw_args() {
        let host = host();
        assert_eq!(
            host.call("args", "kw_args", vec![NativeValue::Int(1), NativeValue::Int(2)]).unwrap(),
            NativeValue::tuple([NativeValue::Int(1), NativeValue::Int(2), NativeValue::None])
        );
        assert_eq!(
            host.call("args", "kw_args", vec![NativeValue::Int(1), NativeValue::Int(2), NativeValue::Int(3)]).unwrap(),
            NativeValue::tuple([1, 2, 3])
        );
        let kwargs = vec![
            ("x".to_string(), NativeValue::Int(1)),
            ("y".to_string(), NativeValue::Int(2)),
            ("z".to_string(), NativeValue::Int(3)),
        ];
        assert_eq!(
            host.call_kw("args", "kw_args", vec![], kwargs).unwrap(),
            NativeValue::tuple([1, 2, 3])
        );
    }

    #[test]
    fn typed_args() {
        let out = host()
            .call("args", "typed_args", vec![NativeValue::Int(42), NativeValue::Float(3.14), "hello".into()])
            .unwrap();
        assert_eq!(
            out,
            NativeValue::dict([
                ("int", NativeValue::Int(42)),
                ("double", NativeValue::Float(3.14)),
                ("str", NativeValue::str("hello")),
            ])
        );
    }

    #[test]
    fn typed_args_marshaling_errors() {
        let host = host();

        let exception = raised(host.call("args", "typed_args", vec![NativeValue::Int(3), NativeValue::Float(2.5)]).unwrap_err());
        assert_eq!(exception.kind(), KindId::ARITY_ERROR);

        let exception = raised(
            host.call("args", "typed_args", vec![NativeValue::Int(3), "x".into(), "hi".into()])
                .unwrap_err(),
        );
        assert_eq!(exception.kind(), KindId::TYPE_ERROR);
        assert_eq!(exception.message(), "typed_args() argument 'd' must be float, not str");

        let kwargs = vec![("i".to_string(), NativeValue::Int(1))];
        let exception = raised(host.call_kw("args", "typed_args", vec![], kwargs).unwrap_err());
        assert_eq!(exception.kind(), KindId::KEYWORD_ERROR);
    }
}

mod threads {
    use super::*;

    #[test]
    fn fib_without_lock() {
        let host = host();
        assert_eq!(host.call("threads", "fib_without_lock", vec![NativeValue::Int(10)]).unwrap(), NativeValue::Int(55));
        assert_eq!(host.call("threads", "fib_without_lock", vec![NativeValue::Int(20)]).unwrap(), NativeValue::Int(6765));
        assert_eq!(host.runtime().lock_state(), LockState::Released);
    }

    #[test]
    fn negative_sleep_is_value_error() {
        let exception = raised(host().call("threads", "sleep_without_lock", vec![NativeValue::Float(-1.0)]).unwrap_err());
        assert_eq!(exception.kind(), KindId::VALUE_ERROR);
    }
}

mod errors {
    use super::*;

    #[test]
    fn raise_value_error() {
        let exception = raised(host().call("errors", "raise_value_error", vec![]).unwrap_err());
        assert_eq!(exception.kind(), KindId::VALUE_ERROR);
        assert_eq!(exception.to_string(), "ValueError: This is a ValueError");
    }

    #[test]
    fn raise_foo_error() {
        let host = host();
        let exception = raised(host.call("errors", "raise_foo_error", vec![]).unwrap_err());
        assert_eq!(exception.qualname(), "errors.FooError");
        assert_eq!(exception.message(), "This is a custom FooError");

        let matched = host
            .with_held(|held, modules| {
                let foo = modules["errors"].kind(held, "FooError").unwrap();
                (
                    held.exception_matches(&exception, foo),
                    held.exception_matches(&exception, KindId::EXCEPTION),
                    held.exception_matches(&exception, KindId::RUNTIME_ERROR),
                )
            })
            .unwrap();
        assert_eq!(matched, (true, true, false));
    }

    #[test]
    fn raise_with_format() {
        let exception = raised(host().call("errors", "raise_with_format", vec![NativeValue::Int(42)]).unwrap_err());
        assert_eq!(exception.kind(), KindId::RUNTIME_ERROR);
        assert_eq!(exception.message(), "Error code: 42");
    }

    #[test]
    fn divide() {
        let host = host();
        assert_eq!(
            host.call("errors", "divide", vec![NativeValue::Float(10.0), NativeValue::Float(2.0)]).unwrap(),
            NativeValue::Float(5.0)
        );
        let exception = raised(host.call("errors", "divide", vec![NativeValue::Float(1.0), NativeValue::Float(0.0)]).unwrap_err());
        assert_eq!(exception.kind(), KindId::ZERO_DIVISION_ERROR);
        assert_eq!(exception.message(), "division by zero");
    }
}

mod types_demo {
    use super::*;

    fn call(function: &str, args: Vec<NativeValue>) -> NativeValue {
        host().call("types_demo", function, args).unwrap()
    }

    #[test]
    fn lists() {
        assert_eq!(call("list_demo", vec![]), NativeValue::list([1, 2, 3]));
        assert_eq!(call("list_sum", vec![NativeValue::list([1, 2, 3, 4])]), NativeValue::Int(10));
        assert_eq!(call("iter_list", vec![NativeValue::list([1, 2, 3])]), NativeValue::list([2, 4, 6]));
    }

    #[test]
    fn list_sum_requires_exact_list() {
        let err = host()
            .call("types_demo", "list_sum", vec![NativeValue::tuple([1, 2])])
            .unwrap_err();
        assert_eq!(raised(err).message(), "list_sum() argument 'list' must be list, not tuple");
    }

    #[test]
    fn dicts() {
        assert_eq!(
            call("dict_demo", vec![]),
            NativeValue::dict([("name", NativeValue::str("Python")), ("version", NativeValue::Int(3))])
        );

        let d = NativeValue::dict([("a", 1), ("b", 2)]);
        assert_eq!(call("dict_get", vec![d.clone(), "a".into()]), NativeValue::Int(1));
        assert_eq!(call("dict_get", vec![d, "c".into()]), NativeValue::None);

        let d = NativeValue::dict([("x", 1), ("y", 2)]);
        assert_eq!(
            call("iter_dict", vec![d]),
            NativeValue::list([
                NativeValue::tuple([NativeValue::str("x"), NativeValue::Int(1)]),
                NativeValue::tuple([NativeValue::str("y"), NativeValue::Int(2)]),
            ])
        );
    }

    #[test]
    fn tuples() {
        assert_eq!(
            call("tuple_demo", vec![]),
            NativeValue::tuple([NativeValue::Int(1), NativeValue::str("hello"), NativeValue::Float(3.14)])
        );
        let t = NativeValue::tuple([NativeValue::Int(42), NativeValue::str("test"), NativeValue::Float(2.5)]);
        assert_eq!(
            call("tuple_unpack", vec![t]),
            NativeValue::dict([
                ("int", NativeValue::Int(42)),
                ("str", NativeValue::str("test")),
                ("float", NativeValue::Float(2.5)),
            ])
        );
    }

    #[test]
    fn sets() {
        assert_eq!(call("set_demo", vec![]), NativeValue::set([1, 2, 3]));
        let s = NativeValue::set([1, 2, 3]);
        assert_eq!(call("set_contains", vec![s.clone(), NativeValue::Int(2)]), NativeValue::Bool(true));
        assert_eq!(call("set_contains", vec![s, NativeValue::Int(5)]), NativeValue::Bool(false));
    }

    #[test]
    fn set_contains_unhashable_item() {
        let err = host()
            .call("types_demo", "set_contains", vec![NativeValue::set([1]), NativeValue::list([1])])
            .unwrap_err();
        assert_eq!(raised(err).kind(), KindId::LOOKUP_ERROR);
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(call("str_demo", vec![]), NativeValue::str("Hello World"));
        assert_eq!(
            call("str_format", vec!["Alice".into(), NativeValue::Int(30)]),
            NativeValue::str("Alice is 30 years old")
        );
        assert_eq!(call("bytes_demo", vec![]), NativeValue::bytes(b"hello bytes".to_vec()));
        assert_eq!(call("bytes_len", vec![NativeValue::bytes(b"hello".to_vec())]), NativeValue::Int(5));
    }
}
