//! Late-bound `IDispatch` calls.
//!
//! The scripting object model has no type library we can link against, so
//! every property and method is resolved by name through `GetIDsOfNames`
//! and called through `Invoke`.  Values cross the boundary as `VARIANT`s and
//! are coerced with `VariantChangeType` before conversion.

use windows::core::{Interface, BSTR, GUID, HSTRING, IUnknown, PCWSTR, VARIANT};
use windows::Win32::System::Com::{
    CoGetObject, IDispatch, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
    DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
};
use windows::Win32::System::Ole::DISPID_PROPERTYPUT;
use windows::Win32::System::Variant::{
    VariantChangeType, VARENUM, VAR_CHANGE_FLAGS, VT_BSTR, VT_I4, VT_UNKNOWN,
};

use crate::errors::TechLocError;

/// `LOCALE_USER_DEFAULT`
const LCID: u32 = 0x0400;

/// An owned `IDispatch` pointer with by-name helpers.
#[derive(Clone)]
pub(crate) struct Dispatch(IDispatch);

impl Dispatch {
    /// Bind to a running object by display name (what `GetObject` does).
    pub fn bind(moniker: &str) -> Result<Self, TechLocError> {
        let name = HSTRING::from(moniker);
        let object: IDispatch = unsafe { CoGetObject(&name, None) }.map_err(|e| {
            TechLocError::ConnectionUnavailable(format!("GetObject({moniker}): {e}"))
        })?;
        Ok(Self(object))
    }

    fn dispid(&self, name: &str) -> Result<i32, TechLocError> {
        let wide = HSTRING::from(name);
        let names = [PCWSTR(wide.as_ptr())];
        let mut id = 0i32;
        unsafe {
            self.0
                .GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LCID, &mut id)
        }
        .map_err(|e| TechLocError::ComError(format!("no member '{name}': {e}")))?;
        Ok(id)
    }

    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> Result<VARIANT, TechLocError> {
        let id = self.dispid(name)?;
        // Invoke expects arguments right to left.
        let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let params = DISPPARAMS {
            rgvarg: reversed.as_mut_ptr(),
            rgdispidNamedArgs: std::ptr::null_mut(),
            cArgs: reversed.len() as u32,
            cNamedArgs: 0,
        };
        let mut result = VARIANT::default();
        let mut excep = EXCEPINFO::default();
        unsafe {
            self.0.Invoke(
                id,
                &GUID::zeroed(),
                LCID,
                flags,
                &params,
                Some(&mut result),
                Some(&mut excep),
                None,
            )
        }
        .map_err(|e| invoke_error(name, e, &excep))?;
        Ok(result)
    }

    /// Read a property.
    pub fn get(&self, name: &str) -> Result<VARIANT, TechLocError> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    /// Call a method, or an indexed property such as `Children(i)`.
    pub fn call(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, TechLocError> {
        self.invoke(
            name,
            DISPATCH_FLAGS(DISPATCH_METHOD.0 | DISPATCH_PROPERTYGET.0),
            args,
        )
    }

    /// Assign a property.
    pub fn put(&self, name: &str, value: VARIANT) -> Result<(), TechLocError> {
        let id = self.dispid(name)?;
        let mut args = [value];
        let mut named = [DISPID_PROPERTYPUT];
        let params = DISPPARAMS {
            rgvarg: args.as_mut_ptr(),
            rgdispidNamedArgs: named.as_mut_ptr(),
            cArgs: 1,
            cNamedArgs: 1,
        };
        let mut excep = EXCEPINFO::default();
        unsafe {
            self.0.Invoke(
                id,
                &GUID::zeroed(),
                LCID,
                DISPATCH_PROPERTYPUT,
                &params,
                None,
                Some(&mut excep),
                None,
            )
        }
        .map_err(|e| invoke_error(name, e, &excep))
    }

    pub fn get_string(&self, name: &str) -> Result<String, TechLocError> {
        to_string(&self.get(name)?)
    }

    pub fn get_i32(&self, name: &str) -> Result<i32, TechLocError> {
        to_i32(&self.get(name)?)
    }

    pub fn get_object(&self, name: &str) -> Result<Dispatch, TechLocError> {
        to_dispatch(&self.get(name)?)
    }

    /// `Item(index)` of a collection object.
    pub fn item(&self, index: usize) -> Result<Dispatch, TechLocError> {
        to_dispatch(&self.call("Item", &[VARIANT::from(index_arg(index)?)])?)
    }
}

pub(crate) fn index_arg(index: usize) -> Result<i32, TechLocError> {
    i32::try_from(index).map_err(|_| TechLocError::ComError(format!("index {index} out of range")))
}

fn coerce(value: &VARIANT, vt: VARENUM) -> Result<VARIANT, TechLocError> {
    let mut out = VARIANT::default();
    unsafe { VariantChangeType(&mut out, value, VAR_CHANGE_FLAGS(0), vt) }
        .map_err(|e| TechLocError::ComError(format!("VARIANT conversion to {}: {e}", vt.0)))?;
    Ok(out)
}

pub(crate) fn to_string(value: &VARIANT) -> Result<String, TechLocError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let bstr = BSTR::try_from(&coerce(value, VT_BSTR)?)?;
    Ok(bstr.to_string())
}

pub(crate) fn to_i32(value: &VARIANT) -> Result<i32, TechLocError> {
    Ok(i32::try_from(&coerce(value, VT_I4)?)?)
}

pub(crate) fn to_dispatch(value: &VARIANT) -> Result<Dispatch, TechLocError> {
    let unknown = IUnknown::try_from(&coerce(value, VT_UNKNOWN)?)?;
    Ok(Dispatch(unknown.cast::<IDispatch>()?))
}

fn invoke_error(name: &str, err: windows::core::Error, excep: &EXCEPINFO) -> TechLocError {
    let description = excep.bstrDescription.to_string();
    if description.is_empty() {
        TechLocError::ComError(format!("{name}: {err}"))
    } else {
        TechLocError::ComError(format!("{name}: {description}"))
    }
}
