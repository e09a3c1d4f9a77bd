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
fn construction_and_field_access() {
    let source = r#"
        class Animal
            def initialize(name)
                this.name = name
            end
            def greet()
                return "I am " + name
            end
        end
        @a = Animal.new("Rex")
        @n = @a.name
        @g = @a.greet()
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "n"), Value::Str("Rex".to_string()));
    assert_eq!(global(&interp, "g"), Value::Str("I am Rex".to_string()));
}

#[test]
fn methods_write_instance_variables_back() {
    let source = r#"
        class Counter
            def initialize()
                this.count = 0
            end
            def bump()
                @count = count + 1
            end
        end
        @c = Counter.new()
        @c.bump()
        @c.bump()
        @n = @c.count
    "#;
    assert_eq!(eval(source, "n"), Value::Int(2));
}

#[test]
fn method_locals_never_become_instance_variables() {
    let source = r#"
        class Box
            def initialize()
                this.kept = 1
            end
            def poke()
                @scratch = 99
            end
        end
        @b = Box.new()
        @b.poke()
        @x = @b.scratch
    "#;
    assert_eq!(fail(source).kind, ErrorKind::VariableUndefined);
}

#[test]
fn method_without_return_yields_the_object() {
    let source = r#"
        class Counter
            def initialize()
                this.count = 0
            end
            def bump()
                @count = count + 1
            end
        end
        @c = Counter.new()
        @same = @c.bump()
        @n = @same.count
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "n"), Value::Int(1));
    assert_eq!(global(&interp, "same"), global(&interp, "c"));
}

#[test]
fn inheritance_copies_the_base_table() {
    let source = r#"
        class Animal
            def initialize(name)
                this.name = name
            end
            def speak()
                return "..."
            end
        end
        class Dog < Animal
            override def speak()
                return "woof"
            end
        end
        @d = Dog.new("Rex")
        @sound = @d.speak()
        @name = @d.name
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "sound"), Value::Str("woof".to_string()));
    assert_eq!(global(&interp, "name"), Value::Str("Rex".to_string()));
}

#[test]
fn redefining_inherited_methods_requires_override() {
    let source = r#"
        class Animal
            def initialize()
            end
            def speak()
                return "..."
            end
        end
        class Dog < Animal
            def speak()
                return "woof"
            end
        end
    "#;
    assert_eq!(fail(source).kind, ErrorKind::OverrideRequired);
}

#[test]
fn abstract_classes_cannot_be_instantiated() {
    let source = r#"
        abstract class Shape
            def initialize()
            end
            abstract def area()
            end
        end
        @s = Shape.new()
    "#;
    assert_eq!(fail(source).kind, ErrorKind::InvalidContext);
}

#[test]
fn concrete_subclass_must_implement_abstract_methods() {
    let source = r#"
        abstract class Shape
            def initialize()
            end
            abstract def area()
            end
        end
        class Square < Shape
        end
    "#;
    assert_eq!(fail(source).kind, ErrorKind::AbstractMethod);
}

#[test]
fn overriding_an_abstract_method_satisfies_it() {
    let source = r#"
        abstract class Shape
            def initialize()
            end
            abstract def area()
            end
        end
        class Square < Shape
            override def area()
                return 9
            end
        end
        @a = Square.new().area()
    "#;
    assert_eq!(eval(source, "a"), Value::Int(9));
}

#[test]
fn private_methods_are_internal_only() {
    let source = r#"
        class Safe
            def initialize()
                this.x = 1
            end
            private def secret()
                return 42
            end
            def reveal()
                return this.secret()
            end
        end
        @s = Safe.new()
        @r = @s.reveal()
    "#;
    assert_eq!(eval(source, "r"), Value::Int(42));

    let direct = r#"
        class Safe
            def initialize()
            end
            private def secret()
                return 42
            end
        end
        @x = Safe.new().secret()
    "#;
    assert_eq!(fail(direct).kind, ErrorKind::InvalidContext);
}

#[test]
fn private_variables_block_external_reads_only() {
    let source = r#"
        class Vault
            private(pin)
            def initialize(pin)
                this.pin = pin
            end
            def check(guess)
                return pin == guess
            end
        end
        @v = Vault.new(1234)
        @ok = @v.check(1234)
    "#;
    assert_eq!(eval(source, "ok"), Value::Bool(true));

    let direct = r#"
        class Vault
            private(pin)
            def initialize(pin)
                this.pin = pin
            end
        end
        @p = Vault.new(1234).pin
    "#;
    assert_eq!(fail(direct).kind, ErrorKind::InvalidContext);
}

#[test]
fn static_methods_dispatch_through_the_class() {
    let source = r#"
        class MathUtil
            static def square(n)
                return n * n
            end
        end
        @x = MathUtil.square(4)
    "#;
    assert_eq!(eval(source, "x"), Value::Int(16));
}

#[test]
fn instance_methods_are_not_callable_through_the_class() {
    let source = r#"
        class Animal
            def initialize()
            end
            def speak()
                return "..."
            end
        end
        @x = Animal.speak()
    "#;
    assert_eq!(fail(source).kind, ErrorKind::InvalidContext);
}

#[test]
fn new_requires_a_constructor() {
    let source = r#"
        class Empty
        end
        @e = Empty.new()
    "#;
    assert_eq!(fail(source).kind, ErrorKind::MethodUndefined);
}

#[test]
fn classes_cannot_be_redefined() {
    let source = r#"
        class Once
        end
        class Once
        end
    "#;
    assert_eq!(fail(source).kind, ErrorKind::ClassRedefinition);
}

#[test]
fn object_reflection_builtins() {
    let source = r#"
        class Point
            def initialize(x, y)
                this.x = x
                this.y = y
            end
        end
        @p = Point.new(1, 2)
        @cls = @p.class_name()
        @h = @p.to_hash()
        @keys = @h.keys()
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "cls"), Value::Str("Point".to_string()));
    assert_eq!(
        global(&interp, "keys"),
        Value::list(vec![Value::Str("x".to_string()), Value::Str("y".to_string())])
    );
}

#[test]
fn objects_serialize_with_class_and_fields() {
    let source = r#"
        class Point
            def initialize(x, y)
                this.x = x
                this.y = y
            end
        end
        @s = str(Point.new(1, 2))
    "#;
    assert_eq!(
        eval(source, "s"),
        Value::Str(r#"Point {"x": 1, "y": 2}"#.to_string())
    );
}

#[test]
fn methods_and_classes_cannot_share_a_name() {
    let source = r#"
        class Thing
        end
        def Thing()
            return 1
        end
    "#;
    assert_eq!(fail(source).kind, ErrorKind::IllegalName);
}
