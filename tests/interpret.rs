use calico::{CoreBuiltins, ErrorKind, Interpreter, ScriptError, SourceMap, Value};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

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

/// Run a script and return one top-level variable
fn eval(source: &str, name: &str) -> Value {
    let interp = run(source);
    global(&interp, name)
}

/// Run a script that must fail uncaught
fn fail(source: &str) -> ScriptError {
    let mut interp = Interpreter::new();
    interp
        .eval_source("<test>", source)
        .expect_err("expected the script to fail")
}

/// Run a script capturing everything printed
fn output(source: &str) -> Vec<String> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let mut interp =
        Interpreter::with_builtins(Box::new(CoreBuiltins::with_sink(Rc::clone(&sink))));
    if let Err(e) = interp.eval_source("<test>", source) {
        panic!("script failed: {}", e);
    }
    let lines = sink.borrow().clone();
    lines
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval("@x = 1 + 2 * 3", "x"), Value::Int(7));
    assert_eq!(eval("@x = (1 + 2) * 3", "x"), Value::Int(9));
    assert_eq!(eval("@x = 7 % 3 + 10 / 2", "x"), Value::Int(6));
    assert_eq!(eval("@x = 1 + 2.5", "x"), Value::Float(3.5));
}

#[test]
fn string_operators() {
    assert_eq!(
        eval(r#"@s = "ab" + "cd""#, "s"),
        Value::Str("abcd".to_string())
    );
    assert_eq!(
        eval(r#"@s = "ha" * 3"#, "s"),
        Value::Str("hahaha".to_string())
    );
    assert_eq!(
        eval(r#"@s = "n=" + 42"#, "s"),
        Value::Str("n=42".to_string())
    );
}

#[test]
fn escape_sequences_decode_at_evaluation() {
    assert_eq!(
        eval(r#"@s = "a\tb\n""#, "s"),
        Value::Str("a\tb\n".to_string())
    );
}

#[test]
fn interpolation_evaluates_expressions() {
    assert_eq!(eval(r#"@s = "${1 + 2}""#, "s"), Value::Str("3".to_string()));
    assert_eq!(
        eval("@n = 5\n@s = \"n is ${@n * 2}\"", "s"),
        Value::Str("n is 10".to_string())
    );
    assert_eq!(
        eval("@a = [1, 2]\n@s = \"${@a}\"", "s"),
        Value::Str("[1, 2]".to_string())
    );
}

#[test]
fn unbalanced_interpolation_is_a_syntax_error() {
    let error = fail(r#"@s = "${1 + 2""#);
    assert_eq!(error.kind, ErrorKind::Syntax);
}

#[test]
fn equality_spans_types_without_raising() {
    assert_eq!(eval("@x = 1 == 1.0", "x"), Value::Bool(true));
    assert_eq!(eval(r#"@x = 1 == "1""#, "x"), Value::Bool(false));
    assert_eq!(eval("@x = [1, 2] == [1, 2]", "x"), Value::Bool(true));
    assert_eq!(eval(r#"@x = "b" > "a""#, "x"), Value::Bool(true));
}

#[test]
fn conditions_must_be_bool() {
    let error = fail("if (1)\n@x = 1\nend");
    assert_eq!(error.kind, ErrorKind::Conversion);
}

#[test]
fn ternary_selects_a_branch() {
    assert_eq!(
        eval(r#"@x = 5 > 3 ? "yes" : "no""#, "x"),
        Value::Str("yes".to_string())
    );
}

#[test]
fn if_elsif_else_takes_the_first_true_branch() {
    let source = r#"
        @x = 2
        @label = ""
        if (@x == 1)
            @label = "one"
        elsif (@x == 2)
            @label = "two"
        else
            @label = "many"
        end
    "#;
    assert_eq!(eval(source, "label"), Value::Str("two".to_string()));
}

#[test]
fn while_re_evaluates_its_condition() {
    let source = r#"
        @i = 0
        @sum = 0
        while (@i < 5)
            @sum = @sum + @i
            @i = @i + 1
        end
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "sum"), Value::Int(10));
    assert_eq!(global(&interp, "i"), Value::Int(5));
}

#[test]
fn for_over_range_and_index() {
    let source = r#"
        @total = 0
        @last = 0
        for @n, @i in [3..5] do
            @total = @total + @n
            @last = @i
        end
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "total"), Value::Int(12));
    assert_eq!(global(&interp, "last"), Value::Int(2));
}

#[test]
fn empty_range_when_bounds_invert() {
    assert_eq!(eval("@r = [5..1]", "r"), Value::list(vec![]));
}

#[test]
fn for_over_hash_follows_insertion_order() {
    let source = r#"
        @order = []
        for @k, @v in {"b": 1, "a": 2} do
            @order.push(@k + "=" + @v)
        end
    "#;
    assert_eq!(
        eval(source, "order"),
        Value::list(vec![
            Value::Str("b=1".to_string()),
            Value::Str("a=2".to_string()),
        ])
    );
}

#[test]
fn break_stops_only_the_innermost_loop() {
    let source = r#"
        @hits = 0
        for @i in [1..3] do
            for @j in [1..3] do
                if (@j == 2)
                    break
                end
                @hits = @hits + 1
            end
        end
    "#;
    assert_eq!(eval(source, "hits"), Value::Int(3));
}

#[test]
fn next_skips_to_the_following_iteration() {
    let source = r#"
        @sum = 0
        for @n in [1..5] do
            if (@n % 2 == 0)
                next
            end
            @sum = @sum + @n
        end
    "#;
    assert_eq!(eval(source, "sum"), Value::Int(9));
}

#[test]
fn block_assignments_merge_but_new_names_do_not_leak() {
    let source = r#"
        @x = 1
        for @i in [1..3] do
            @x = 2
            @leak = 9
        end
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "x"), Value::Int(2));
    assert_eq!(interp.global("leak"), None);
    assert_eq!(interp.global("i"), None);
}

#[test]
fn method_defaults_evaluate_at_call_time() {
    let source = r#"
        def add(a, b = 10)
            return a + b
        end
        @x = add(5)
        @y = add(1, 2)
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "x"), Value::Int(15));
    assert_eq!(global(&interp, "y"), Value::Int(3));
}

#[test]
fn missing_parameter_is_an_error() {
    let error = fail("def add(a, b)\nreturn a + b\nend\n@x = add(1)");
    assert_eq!(error.kind, ErrorKind::ParameterMissing);
}

#[test]
fn too_many_arguments_is_an_error() {
    let error = fail("def one(a)\nreturn a\nend\n@x = one(1, 2)");
    assert_eq!(error.kind, ErrorKind::ParameterCountMismatch);
}

#[test]
fn return_unwinds_nested_blocks() {
    let source = r#"
        def classify(n)
            if (n > 10)
                if (true)
                    return "big"
                end
            end
            return "small"
        end
        @a = classify(20)
        @b = classify(3)
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "a"), Value::Str("big".to_string()));
    assert_eq!(global(&interp, "b"), Value::Str("small".to_string()));
}

#[test]
fn lambdas_are_first_class() {
    let source = r#"
        @double = lambda(x)
            return x * 2
        end
        @r = @double(4)
    "#;
    assert_eq!(eval(source, "r"), Value::Int(8));
}

#[test]
fn lambdas_pass_as_arguments() {
    let source = r#"
        def apply(f, x)
            return f(x)
        end
        @r = apply(lambda(n) return n + 1 end, 41)
    "#;
    assert_eq!(eval(source, "r"), Value::Int(42));
}

#[test]
fn list_map_select_reduce() {
    let source = r#"
        @nums = [1, 2, 3, 4]
        @doubled = @nums.map(lambda(n) return n * 2 end)
        @evens = @nums.select(lambda(n) return n % 2 == 0 end)
        @sum = @nums.reduce(lambda(a, b) return a + b end)
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "doubled"),
        Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6), Value::Int(8)])
    );
    assert_eq!(
        global(&interp, "evens"),
        Value::list(vec![Value::Int(2), Value::Int(4)])
    );
    assert_eq!(global(&interp, "sum"), Value::Int(10));
}

#[test]
fn lists_are_shared_references() {
    let source = r#"
        @a = [1, 2]
        @b = @a
        @b.push(3)
        @n = len(@a)
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "n"), Value::Int(3));
    assert_eq!(global(&interp, "a"), global(&interp, "b"));
}

#[test]
fn indexed_assignment() {
    let source = r#"
        @a = [1, 2, 3]
        @a[1] = 99
        @m = [[1, 2], [3, 4]]
        @m[0][1] = 9
        @h = {"k": 1}
        @h["new"] = 2
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "a"),
        Value::list(vec![Value::Int(1), Value::Int(99), Value::Int(3)])
    );
    let m = global(&interp, "m");
    let Value::List(rows) = &m else { panic!("not a list") };
    assert_eq!(
        rows.borrow()[0],
        Value::list(vec![Value::Int(1), Value::Int(9)])
    );
    let h = global(&interp, "h");
    let Value::Hash(map) = &h else { panic!("not a hash") };
    assert_eq!(map.borrow().get("new"), Some(&Value::Int(2)));
}

#[test]
fn slices_are_inclusive() {
    let source = r#"
        @a = [10, 20, 30, 40]
        @mid = @a[1..2]
        @s = "calico"[0..2]
        @b = [1, 2, 3]
        @b[0..1] = [7, 8, 9]
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "mid"),
        Value::list(vec![Value::Int(20), Value::Int(30)])
    );
    assert_eq!(global(&interp, "s"), Value::Str("cal".to_string()));
    assert_eq!(
        global(&interp, "b"),
        Value::list(vec![Value::Int(7), Value::Int(8), Value::Int(9), Value::Int(3)])
    );
}

#[test]
fn out_of_bounds_index_raises() {
    assert_eq!(fail("@x = [1, 2][5]").kind, ErrorKind::Index);
    assert_eq!(fail(r#"@x = {"a": 1}["b"]"#).kind, ErrorKind::HashKeyMissing);
}

#[test]
fn hash_keeps_insertion_order() {
    let source = r#"
        @h = {"z": 1, "a": 2}
        @h["m"] = 3
        @keys = @h.keys()
        @removed = @h.remove("z")
        @after = @h.keys()
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "keys"),
        Value::list(vec![
            Value::Str("z".to_string()),
            Value::Str("a".to_string()),
            Value::Str("m".to_string()),
        ])
    );
    assert_eq!(global(&interp, "removed"), Value::Int(1));
    assert_eq!(
        global(&interp, "after"),
        Value::list(vec![Value::Str("a".to_string()), Value::Str("m".to_string())])
    );
}

#[test]
fn serialization_round_trips_literal_forms() {
    let source = r#"
        @s1 = str([1, 2.0, "a b"])
        @s2 = str({"k": [true, false]})
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "s1"),
        Value::Str(r#"[1, 2.0, "a b"]"#.to_string())
    );
    assert_eq!(
        global(&interp, "s2"),
        Value::Str(r#"{"k": [true, false]}"#.to_string())
    );
}

#[test]
fn try_catch_binds_the_message() {
    let source = r#"
        @msg = ""
        try
            @x = 1 / 0
        catch (e)
            @msg = e
        end
    "#;
    assert_eq!(
        eval(source, "msg"),
        Value::Str("division by zero".to_string())
    );
}

#[test]
fn try_catch_binds_kind_and_message() {
    let source = r#"
        @kind = ""
        try
            @x = [1, 2][5]
        catch (k, m)
            @kind = k
        end
    "#;
    assert_eq!(eval(source, "kind"), Value::Str("index-error".to_string()));
}

#[test]
fn catch_clears_error_state() {
    let source = r#"
        @first = ""
        @second = ""
        try
            @x = 1 / 0
        catch (e)
            @first = e
        end
        try
            @y = int("nope")
        catch (k, m)
            @second = k
        end
        @alive = true
    "#;
    let interp = run(source);
    assert_eq!(
        global(&interp, "first"),
        Value::Str("division by zero".to_string())
    );
    assert_eq!(
        global(&interp, "second"),
        Value::Str("conversion-error".to_string())
    );
    assert_eq!(global(&interp, "alive"), Value::Bool(true));
}

#[test]
fn catch_body_is_skipped_without_an_error() {
    let source = r#"
        @ran = false
        try
            @ok = 1
        catch (e)
            @ran = true
        end
    "#;
    assert_eq!(eval(source, "ran"), Value::Bool(false));
}

#[test]
fn error_escapes_a_try_without_catch() {
    let error = fail("try\n@x = 1 / 0\nend");
    assert_eq!(error.kind, ErrorKind::DivideByZero);
}

#[test]
fn errors_in_nested_blocks_reach_the_enclosing_try() {
    let source = r#"
        @msg = ""
        try
            if (true)
                @x = 1 / 0
            end
        catch (e)
            @msg = e
        end
    "#;
    assert_eq!(
        eval(source, "msg"),
        Value::Str("division by zero".to_string())
    );
}

#[test]
fn uncaught_errors_carry_their_kind() {
    assert_eq!(fail("@x = @missing + 1").kind, ErrorKind::VariableUndefined);
    assert_eq!(fail("@x = 1 / 0").kind, ErrorKind::DivideByZero);
    assert_eq!(fail("@x = nothing_here()").kind, ErrorKind::MethodUndefined);
}

#[test]
fn runaway_recursion_hits_the_depth_cap() {
    let source = r#"
        def dive()
            return dive()
        end
        @x = dive()
    "#;
    assert_eq!(fail(source).kind, ErrorKind::InvalidOperation);
}

#[test]
fn exit_sets_the_exit_code() {
    let mut interp = Interpreter::new();
    let code = interp.eval_source("<test>", "exit 3").expect("eval failed");
    assert_eq!(code, 3);

    let mut interp = Interpreter::new();
    let code = interp
        .eval_source("<test>", "@x = 1; exit; @y = 2")
        .expect("eval failed");
    assert_eq!(code, 0);
}

#[test]
fn conversion_builtins() {
    let source = r#"
        @a = int("42")
        @b = float(3)
        @c = str(1.5)
        @d = typeof([1])
        @e = len("héllo")
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "a"), Value::Int(42));
    assert_eq!(global(&interp, "b"), Value::Float(3.0));
    assert_eq!(global(&interp, "c"), Value::Str("1.5".to_string()));
    assert_eq!(global(&interp, "d"), Value::Str("list".to_string()));
    assert_eq!(global(&interp, "e"), Value::Int(5));
}

#[test]
fn string_builtins() {
    let source = r#"
        @up = "abc".upper()
        @parts = "a,b,c".split(",")
        @joined = ["x", "y"].join("-")
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "up"), Value::Str("ABC".to_string()));
    assert_eq!(
        global(&interp, "parts"),
        Value::list(vec![
            Value::Str("a".to_string()),
            Value::Str("b".to_string()),
            Value::Str("c".to_string()),
        ])
    );
    assert_eq!(global(&interp, "joined"), Value::Str("x-y".to_string()));
}

#[test]
fn print_joins_arguments_with_spaces() {
    let lines = output(r#"println("a", 1, true)"#);
    assert_eq!(lines, vec!["a 1 true".to_string()]);
}

#[test]
fn globals_persist_across_interpret_calls() {
    let mut interp = Interpreter::new();
    interp.preserve_globals(true);
    interp.eval_source("<test>", "@x = 41").expect("eval failed");
    interp.eval_source("<test>", "@x = @x + 1").expect("eval failed");
    assert_eq!(interp.global("x"), Some(Value::Int(42)));
}

#[test]
fn int_arithmetic_wraps_at_the_boundaries() {
    let source = r#"
        @min = 0 - 9223372036854775807 - 1
        @q = @min / (0 - 1)
        @r = @min % (0 - 1)
        @n = -(@min)
    "#;
    let interp = run(source);
    assert_eq!(global(&interp, "q"), Value::Int(i64::MIN));
    assert_eq!(global(&interp, "r"), Value::Int(0));
    assert_eq!(global(&interp, "n"), Value::Int(i64::MIN));
}

#[test]
fn modulo_promotes_mixed_operands() {
    assert_eq!(eval("@x = 7 % 2.0", "x"), Value::Float(1.0));
    assert_eq!(eval("@x = 7.5 % 2", "x"), Value::Float(1.5));
}

#[test]
fn lambdas_returned_from_methods_stay_callable() {
    let source = r#"
        def make()
            return lambda(x)
                return x + 1
            end
        end
        @f = make()
        @x = @f(41)
    "#;
    assert_eq!(eval(source, "x"), Value::Int(42));
}

#[test]
fn lambdas_returned_through_branches_stay_callable() {
    let source = r#"
        def pick(flag)
            if (flag)
                return lambda(n)
                    return n * 2
                end
            end
            return lambda(n)
                return n
            end
        end
        @f = pick(true)
        @x = @f(21)
    "#;
    assert_eq!(eval(source, "x"), Value::Int(42));
}

#[test]
fn lambdas_assigned_in_branches_survive_the_block() {
    let source = r#"
        @f = 0
        if (true)
            @f = lambda(n)
                return n * 2
            end
        end
        @x = @f(21)
    "#;
    assert_eq!(eval(source, "x"), Value::Int(42));
}

#[test]
fn recursion_within_the_depth_cap_succeeds() {
    let source = r#"
        def count(n)
            if (n == 0)
                return 0
            end
            return count(n - 1)
        end
        @x = count(40)
    "#;
    assert_eq!(eval(source, "x"), Value::Int(0));
}

#[test]
fn fatal_reports_render_without_registered_source() {
    let map = SourceMap::new();
    let error = ScriptError::bare(ErrorKind::EmptyStack, "no frames");
    let rendered = format!("{}", map.report(&error));
    assert!(rendered.contains("empty-stack"));
}
