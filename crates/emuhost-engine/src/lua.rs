//! [`ScriptHost`] backed by an embedded Lua 5.4 interpreter.

use mlua::{Function, Lua, Value, Variadic};

use crate::output::{OutputChannel, OutputSink};
use crate::script::{ScriptError, ScriptHost, ScriptResult};

pub struct LuaScriptHost {
    lua: Lua,
}

impl LuaScriptHost {
    /// Creates an interpreter whose `print` writes to `output` on the info channel.
    pub fn new(output: OutputSink) -> mlua::Result<Self> {
        let lua = Lua::new();
        install_print(&lua, output)?;
        Ok(Self { lua })
    }

    /// Publishes the engine's frame counter as the global `frame`.
    pub fn set_frame(&self, frame: u64) {
        let frame = i64::try_from(frame).unwrap_or(i64::MAX);
        if let Err(err) = self.lua.globals().set("frame", frame) {
            tracing::warn!(error = %err, "failed to update lua frame global");
        }
    }
}

fn install_print(lua: &Lua, output: OutputSink) -> mlua::Result<()> {
    let print = lua.create_function(move |lua, values: Variadic<Value>| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut line = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                line.push(b'\t');
            }
            let text: mlua::String = tostring.call(value)?;
            line.extend_from_slice(text.as_bytes());
        }
        line.push(b'\n');
        output.write(OutputChannel::Info, &line);
        Ok(())
    })?;
    lua.globals().set("print", print)
}

fn convert(value: Value<'_>) -> Result<ScriptResult, ScriptError> {
    match value {
        Value::Nil => Ok(ScriptResult::Nothing),
        Value::Boolean(b) => Ok(ScriptResult::Boolean(b)),
        Value::Integer(i) => Ok(ScriptResult::Integer(i)),
        Value::Number(n) => Ok(ScriptResult::Real(n)),
        Value::String(s) => Ok(ScriptResult::Text(s.as_bytes().to_vec())),
        other => Err(ScriptError::UnsupportedValue(other.type_name())),
    }
}

impl ScriptHost for LuaScriptHost {
    fn execute(&mut self, chunk_name: &str, code: &str) -> Result<ScriptResult, ScriptError> {
        let function = self
            .lua
            .load(code)
            .set_name(chunk_name)
            .into_function()
            .map_err(|err| ScriptError::Compile(err.to_string()))?;
        let value: Value = function
            .call(())
            .map_err(|err| ScriptError::Runtime(err.to_string()))?;
        convert(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;

    fn host() -> LuaScriptHost {
        LuaScriptHost::new(OutputSink::discard()).unwrap()
    }

    #[test]
    fn maps_scalar_results() {
        let mut lua = host();
        assert_eq!(lua.execute("=t", "return 5").unwrap(), ScriptResult::Integer(5));
        assert_eq!(lua.execute("=t", "return 2.5").unwrap(), ScriptResult::Real(2.5));
        assert_eq!(lua.execute("=t", "return true").unwrap(), ScriptResult::Boolean(true));
        assert_eq!(lua.execute("=t", "return nil").unwrap(), ScriptResult::Nothing);
        assert_eq!(lua.execute("=t", "x = 1").unwrap(), ScriptResult::Nothing);
        assert_eq!(
            lua.execute("=t", "return 'a\\0b'").unwrap(),
            ScriptResult::Text(b"a\0b".to_vec())
        );
    }

    #[test]
    fn state_persists_between_chunks() {
        let mut lua = host();
        lua.execute("=t", "counter = 41").unwrap();
        assert_eq!(
            lua.execute("=t", "counter = counter + 1 return counter").unwrap(),
            ScriptResult::Integer(42)
        );
    }

    #[test]
    fn separates_compile_and_runtime_errors() {
        let mut lua = host();
        assert!(matches!(
            lua.execute("=t", "return +"),
            Err(ScriptError::Compile(_))
        ));
        assert!(matches!(
            lua.execute("=t", "error('boom')"),
            Err(ScriptError::Runtime(msg)) if msg.contains("boom")
        ));
        assert!(matches!(
            lua.execute("=t", "return {}"),
            Err(ScriptError::UnsupportedValue("table"))
        ));
    }

    #[test]
    fn print_goes_to_info_channel() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let lines = lines.clone();
            OutputSink::new(move |channel, bytes| {
                lines.lock().unwrap().push((channel, bytes.to_vec()))
            })
        };
        let mut lua = LuaScriptHost::new(sink).unwrap();
        lua.execute("=t", "print('a', 1, nil)").unwrap();
        assert_eq!(
            *lines.lock().unwrap(),
            vec![(OutputChannel::Info, b"a\t1\tnil\n".to_vec())]
        );
    }

    #[test]
    fn frame_global_tracks_engine() {
        let mut lua = host();
        lua.set_frame(12);
        assert_eq!(lua.execute("=t", "return frame").unwrap(), ScriptResult::Integer(12));
    }
}
