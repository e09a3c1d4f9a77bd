use calico::{ErrorKind, Interpreter, ScriptError, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Interpreter {
    let mut interp = Interpreter::new();
    interp.preserve_globals(true);
    if let Err(e) = interp.eval_source("<test>", source) {
        panic!("script failed: {}", e);
    }
    interp
}

fn global(interp: &Interpreter, name: &str) -> Value {
    interp
        .global(name)
        .unwrap_or_else(|| panic!("no top-level variable `{}`", name))
}

fn eval(source: &str, name: &str) -> Value {
    let interp = run(source);
    global(&interp, name)
}

fn fail(source: &str) -> ScriptError {
    let mut interp = Interpreter::new();
    interp
        .eval_source("<test>", source)
        .expect_err("expected the script to fail")
}

#[test]
fn import_registers_namespaced_methods() {
    let source = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        import Geometry
        @a = Geometry::area(2, 3)
    "#;
    assert_eq!(eval(source, "a"), Value::Int(6));
}

#[test]
fn module_methods_are_not_visible_unqualified() {
    let source = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        import Geometry
        @a = area(2, 3)
    "#;
    assert_eq!(fail(source).kind, ErrorKind::MethodUndefined);
}

#[test]
fn module_methods_call_siblings_unqualified() {
    let source = r#"
        module Temp
            def to_f(c)
                return c * 9 / 5 + 32
            end
            def boiling_f()
                return to_f(100)
            end
        end
        import Temp
        @f = Temp::boiling_f()
    "#;
    assert_eq!(eval(source, "f"), Value::Int(212));
}

#[test]
fn importing_an_undefined_module_fails() {
    assert_eq!(fail("import Nowhere").kind, ErrorKind::ModuleUndefined);
}

#[test]
fn methods_before_import_are_unavailable() {
    let source = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        @a = Geometry::area(2, 3)
    "#;
    assert_eq!(fail(source).kind, ErrorKind::MethodUndefined);
}

#[test]
fn alias_exposes_methods_as_a_static_class() {
    let source = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        import Geometry as Geo
        @a = Geo.area(2, 3)
    "#;
    assert_eq!(eval(source, "a"), Value::Int(6));
}

#[test]
fn aliasing_consumes_the_module() {
    let qualified = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        import Geometry as Geo
        @a = Geometry::area(2, 3)
    "#;
    assert_eq!(fail(qualified).kind, ErrorKind::MethodUndefined);

    let reimport = r#"
        module Geometry
            def area(w, h)
                return w * h
            end
        end
        import Geometry as Geo
        import Geometry
    "#;
    assert_eq!(fail(reimport).kind, ErrorKind::ModuleUndefined);
}

#[test]
fn export_pulls_a_nested_module_in() {
    let source = r#"
        module Inner
            def f()
                return 1
            end
        end
        module Outer
            export Inner
        end
        import Outer
        @x = Inner::f()
    "#;
    assert_eq!(eval(source, "x"), Value::Int(1));
}

#[test]
fn module_state_runs_at_import_time() {
    let source = r#"
        @seen = 0
        module Tick
            @seen = @seen + 1
        end
        import Tick
        import Tick
    "#;
    assert_eq!(eval(source, "seen"), Value::Int(2));
}

#[test]
fn file_imports_share_registries() {
    let path = std::env::temp_dir().join("calico_module_test_helper.cal");
    std::fs::write(
        &path,
        "def helper(n)\n    return n + 1\nend\n@from_file = 10\n",
    )
    .expect("write helper script");

    let source = format!(
        "import \"{}\"\n@x = helper(41)",
        path.display()
    );
    assert_eq!(eval(&source, "x"), Value::Int(42));
}

#[test]
fn missing_file_import_is_fatal_even_inside_try() {
    let source = r#"
        @caught = false
        try
            import "/nonexistent/calico_no_such_file.cal"
        catch (e)
            @caught = true
        end
    "#;
    let mut interp = Interpreter::new();
    let error = interp
        .eval_source("<test>", source)
        .expect_err("expected a fatal error");
    assert_eq!(error.kind, ErrorKind::InvalidOperation);
    assert!(error.fatal);
}
