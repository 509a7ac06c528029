//! tonic implementation of `instill.model.v1alpha.ModelService`, delegating to [ModelService].

use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::{
    convert,
    generated::{
        self as pb,
        model_service_server::{ModelService as ModelServiceTrait, ModelServiceServer},
    },
};
use crate::{
    api_types::{CreateModelRequest, TriggerModelInstanceRequest, UpdateModelRequest},
    error::ServiceError,
    router::OWNER_HEADER,
    service::ModelService,
};

type RpcResult<T> = std::result::Result<Response<T>, Status>;

/// gRPC server sharing one [ModelService] with the REST router.
pub struct ModelGrpcServer {
    service: Arc<ModelService>,
}

impl ModelGrpcServer {
    pub fn new(service: Arc<ModelService>) -> Self {
        Self { service }
    }

    pub fn into_service(self) -> ModelServiceServer<Self> {
        ModelServiceServer::new(self)
    }
}

/// Owner the request acts for, from the `owner-id` metadata.
fn owner_id<T>(request: &Request<T>) -> Option<&str> {
    request
        .metadata()
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
}

#[tonic::async_trait]
impl ModelServiceTrait for ModelGrpcServer {
    //
    // Health
    //

    async fn liveness(
        &self,
        _request: Request<pb::LivenessRequest>,
    ) -> RpcResult<pb::LivenessResponse> {
        let health = self.service.liveness().await;
        Ok(Response::new(pb::LivenessResponse {
            health_check_response: Some(convert::health(health)),
        }))
    }

    async fn readiness(
        &self,
        _request: Request<pb::ReadinessRequest>,
    ) -> RpcResult<pb::ReadinessResponse> {
        let health = self.service.readiness().await;
        Ok(Response::new(pb::ReadinessResponse {
            health_check_response: Some(convert::health(health)),
        }))
    }

    //
    // Model definitions
    //

    async fn list_model_definition(
        &self,
        request: Request<pb::ListModelDefinitionRequest>,
    ) -> RpcResult<pb::ListModelDefinitionResponse> {
        let req = request.into_inner();
        let view = req.view();
        let list = convert::list_request(req.page_size, req.page_token, view)?;

        let response = self.service.list_model_definition(list).await?;
        Ok(Response::new(pb::ListModelDefinitionResponse {
            model_definitions: response
                .model_definitions
                .into_iter()
                .map(convert::definition)
                .collect(),
            next_page_token: response.next_page_token,
            total_size: response.total_size as i64,
        }))
    }

    async fn get_model_definition(
        &self,
        request: Request<pb::GetModelDefinitionRequest>,
    ) -> RpcResult<pb::GetModelDefinitionResponse> {
        let req = request.into_inner();
        let definition = self
            .service
            .get_model_definition(&req.name, convert::view(req.view()))
            .await?;

        Ok(Response::new(pb::GetModelDefinitionResponse {
            model_definition: Some(convert::definition(definition)),
        }))
    }

    //
    // Models
    //

    async fn create_model(
        &self,
        request: Request<pb::CreateModelRequest>,
    ) -> RpcResult<pb::CreateModelResponse> {
        let owner = self.service.owner_name(owner_id(&request));
        let req = request.into_inner();

        let model = self
            .service
            .create_model(
                &owner,
                CreateModelRequest {
                    id: req.id,
                    description: req.description,
                    model_definition: req.model_definition,
                    configuration: req.configuration.map(convert::from_struct),
                },
            )
            .await?;

        Ok(Response::new(pb::CreateModelResponse {
            model: Some(convert::model(model)),
        }))
    }

    async fn list_model(
        &self,
        request: Request<pb::ListModelRequest>,
    ) -> RpcResult<pb::ListModelResponse> {
        let req = request.into_inner();
        let view = req.view();
        let list = convert::list_request(req.page_size, req.page_token, view)?;

        let response = self.service.list_model(list).await?;
        Ok(Response::new(pb::ListModelResponse {
            models: response.models.into_iter().map(convert::model).collect(),
            next_page_token: response.next_page_token,
            total_size: response.total_size as i64,
        }))
    }

    async fn get_model(
        &self,
        request: Request<pb::GetModelRequest>,
    ) -> RpcResult<pb::GetModelResponse> {
        let req = request.into_inner();
        let model = self
            .service
            .get_model(&req.name, convert::view(req.view()))
            .await?;

        Ok(Response::new(pb::GetModelResponse {
            model: Some(convert::model(model)),
        }))
    }

    async fn update_model(
        &self,
        request: Request<pb::UpdateModelRequest>,
    ) -> RpcResult<pb::UpdateModelResponse> {
        let req = request.into_inner();
        let model = req
            .model
            .ok_or_else(|| ServiceError::InvalidArgument("model is required".to_owned()))?;

        let updated = self
            .service
            .update_model(
                &model.name,
                UpdateModelRequest {
                    model: serde_json::json!({ "description": model.description }),
                    update_mask: req.update_mask.unwrap_or_default().paths,
                },
            )
            .await?;

        Ok(Response::new(pb::UpdateModelResponse {
            model: Some(convert::model(updated)),
        }))
    }

    async fn delete_model(
        &self,
        request: Request<pb::DeleteModelRequest>,
    ) -> RpcResult<pb::DeleteModelResponse> {
        self.service.delete_model(&request.into_inner().name).await?;
        Ok(Response::new(pb::DeleteModelResponse {}))
    }

    async fn look_up_model(
        &self,
        request: Request<pb::LookUpModelRequest>,
    ) -> RpcResult<pb::LookUpModelResponse> {
        let req = request.into_inner();
        let model = self
            .service
            .lookup_model(&req.permalink, convert::view(req.view()))
            .await?;

        Ok(Response::new(pb::LookUpModelResponse {
            model: Some(convert::model(model)),
        }))
    }

    async fn publish_model(
        &self,
        request: Request<pb::PublishModelRequest>,
    ) -> RpcResult<pb::PublishModelResponse> {
        let model = self.service.publish_model(&request.into_inner().name).await?;
        Ok(Response::new(pb::PublishModelResponse {
            model: Some(convert::model(model)),
        }))
    }

    async fn unpublish_model(
        &self,
        request: Request<pb::UnpublishModelRequest>,
    ) -> RpcResult<pb::UnpublishModelResponse> {
        let model = self
            .service
            .unpublish_model(&request.into_inner().name)
            .await?;
        Ok(Response::new(pb::UnpublishModelResponse {
            model: Some(convert::model(model)),
        }))
    }

    //
    // Model instances
    //

    async fn list_model_instance(
        &self,
        request: Request<pb::ListModelInstanceRequest>,
    ) -> RpcResult<pb::ListModelInstanceResponse> {
        let req = request.into_inner();
        let view = req.view();
        let list = convert::list_request(req.page_size, req.page_token, view)?;

        let response = self.service.list_model_instance(&req.parent, list).await?;
        Ok(Response::new(pb::ListModelInstanceResponse {
            instances: response
                .instances
                .into_iter()
                .map(convert::instance)
                .collect(),
            next_page_token: response.next_page_token,
            total_size: response.total_size as i64,
        }))
    }

    async fn get_model_instance(
        &self,
        request: Request<pb::GetModelInstanceRequest>,
    ) -> RpcResult<pb::GetModelInstanceResponse> {
        let req = request.into_inner();
        let instance = self
            .service
            .get_model_instance(&req.name, convert::view(req.view()))
            .await?;

        Ok(Response::new(pb::GetModelInstanceResponse {
            instance: Some(convert::instance(instance)),
        }))
    }

    async fn look_up_model_instance(
        &self,
        request: Request<pb::LookUpModelInstanceRequest>,
    ) -> RpcResult<pb::LookUpModelInstanceResponse> {
        let req = request.into_inner();
        let instance = self
            .service
            .lookup_model_instance(&req.permalink, convert::view(req.view()))
            .await?;

        Ok(Response::new(pb::LookUpModelInstanceResponse {
            instance: Some(convert::instance(instance)),
        }))
    }

    async fn deploy_model_instance(
        &self,
        request: Request<pb::DeployModelInstanceRequest>,
    ) -> RpcResult<pb::DeployModelInstanceResponse> {
        let deployed = self
            .service
            .deploy_model_instance(&request.into_inner().name)
            .await?;

        Ok(Response::new(pb::DeployModelInstanceResponse {
            instance: Some(convert::instance(deployed.instance)),
            operation: Some(convert::operation(deployed.operation)),
        }))
    }

    async fn undeploy_model_instance(
        &self,
        request: Request<pb::UndeployModelInstanceRequest>,
    ) -> RpcResult<pb::UndeployModelInstanceResponse> {
        let instance = self
            .service
            .undeploy_model_instance(&request.into_inner().name)
            .await?;

        Ok(Response::new(pb::UndeployModelInstanceResponse {
            instance: Some(convert::instance(instance)),
        }))
    }

    async fn get_model_instance_card(
        &self,
        request: Request<pb::GetModelInstanceCardRequest>,
    ) -> RpcResult<pb::GetModelInstanceCardResponse> {
        let card = self
            .service
            .get_model_instance_card(&request.into_inner().name)
            .await?;

        Ok(Response::new(pb::GetModelInstanceCardResponse {
            readme: Some(convert::card(card)),
        }))
    }

    async fn trigger_model_instance(
        &self,
        request: Request<pb::TriggerModelInstanceRequest>,
    ) -> RpcResult<pb::TriggerModelInstanceResponse> {
        let req = request.into_inner();
        let response = self
            .service
            .trigger_model_instance(
                &req.name,
                TriggerModelInstanceRequest {
                    inputs: convert::trigger_inputs(req.inputs),
                },
            )
            .await?;

        let (task, output) = convert::trigger_output(response)?;
        Ok(Response::new(pb::TriggerModelInstanceResponse {
            task: task.into(),
            output,
        }))
    }

    async fn test_model_instance(
        &self,
        request: Request<pb::TestModelInstanceRequest>,
    ) -> RpcResult<pb::TestModelInstanceResponse> {
        let req = request.into_inner();
        let response = self
            .service
            .test_model_instance(
                &req.name,
                TriggerModelInstanceRequest {
                    inputs: convert::trigger_inputs(req.inputs),
                },
            )
            .await?;

        let (task, output) = convert::trigger_output(response)?;
        Ok(Response::new(pb::TestModelInstanceResponse {
            task: task.into(),
            output,
        }))
    }

    //
    // Operations
    //

    async fn get_model_operation(
        &self,
        request: Request<pb::GetModelOperationRequest>,
    ) -> RpcResult<pb::GetModelOperationResponse> {
        let operation = self
            .service
            .get_model_operation(&request.into_inner().name)
            .await?;

        Ok(Response::new(pb::GetModelOperationResponse {
            operation: Some(convert::operation(operation)),
        }))
    }

    async fn list_model_operation(
        &self,
        _request: Request<pb::ListModelOperationRequest>,
    ) -> RpcResult<pb::ListModelOperationResponse> {
        let response = self.service.list_model_operation().await?;
        Ok(Response::new(pb::ListModelOperationResponse {
            operations: response
                .operations
                .into_iter()
                .map(convert::operation)
                .collect(),
        }))
    }
}
